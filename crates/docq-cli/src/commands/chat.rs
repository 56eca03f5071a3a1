//! Chat command - multi-turn session on stdin.

use docq_engine::QueryRequest;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{build_agent, print_response};

pub(crate) async fn run(data: &Path, collection: &str) -> miette::Result<()> {
    let agent = build_agent(data)?;
    let mut session = agent.sessions().begin_session(None);

    println!("docq chat on '{}' (session {})", collection, session);
    println!("Commands: :history, :new, :quit\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| miette::miette!("Failed to read input: {}", e))?
        else {
            break;
        };

        match line.trim() {
            "" => continue,
            ":quit" | ":exit" => break,
            ":history" => {
                print!("{}", agent.sessions().conversation_history(session));
                continue;
            }
            ":new" => {
                session = agent.sessions().begin_session(None);
                println!("Started session {}", session);
                continue;
            }
            question => {
                let response = agent
                    .handle(QueryRequest::new(collection, question).in_session(session))
                    .await;
                match (&response.error, response.error_type) {
                    (Some(error), Some(kind)) => println!("[{}] {}", kind, error),
                    (Some(error), None) => println!("Query failed: {}", error),
                    (None, _) => {
                        print_response(&response)?;
                        println!(
                            "{} result(s) in {:.3}s",
                            response.data.len(),
                            response.execution_time
                        );
                    }
                }
            }
        }
    }

    println!("Session {} ended", session);
    Ok(())
}
