//! Query command - answer a single question.

use docq_engine::QueryRequest;
use std::path::Path;
use uuid::Uuid;

use super::{build_agent, print_response};

pub(crate) async fn run(
    data: &Path,
    collection: &str,
    text: &str,
    session: Option<Uuid>,
) -> miette::Result<()> {
    let agent = build_agent(data)?;

    let mut request = QueryRequest::new(collection, text);
    if let Some(id) = session {
        request = request.in_session(id);
    }

    let response = agent.handle(request).await;
    print_response(&response)?;

    match (&response.error, response.error_type) {
        (Some(error), Some(kind)) => Err(miette::miette!("{} error: {}", kind, error)),
        (Some(error), None) => Err(miette::miette!("Query failed: {}", error)),
        _ => Ok(()),
    }
}
