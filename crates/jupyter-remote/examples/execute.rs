//! Run code on a kernel that is already running on a Jupyter server.
//!
//! Usage:
//!   cargo run -p jupyter-remote --example execute -- <server-url> [code]
//!
//! Example:
//!   cargo run -p jupyter-remote --example execute -- "http://localhost:8888/lab?token=mytoken" "print('hello')"

use jupyter_remote::{KernelOutput, RemoteKernelSession, RemoteServer};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <server-url> [code]", args[0]);
        std::process::exit(1);
    }

    let server = RemoteServer::from_url(&args[1])?;
    let code = args
        .get(2)
        .map(|s| s.as_str())
        .unwrap_or("import os; os.getcwd()");

    let http = reqwest::Client::new();
    server.check_connection(&http).await?;

    let kernels = server.list_kernels(&http).await?;
    let Some(kernel) = kernels.first() else {
        eprintln!("No kernels running on {}; start one from a notebook first", server.base_url);
        std::process::exit(1);
    };
    println!("Using kernel {} ({})", kernel.id, kernel.name);

    let session = RemoteKernelSession::new(server.clone(), kernel.id.clone());
    for output in session.execute_silently(code).await? {
        match output {
            KernelOutput::Stream { name, text } => print!("[{}] {}", name, text),
            KernelOutput::Error {
                ename,
                evalue,
                traceback,
            } => {
                eprintln!("{}: {}", ename, evalue);
                for line in traceback {
                    eprintln!("{}", line);
                }
            }
            other => {
                if let Some(text) = other.plain_text() {
                    println!("{}", text);
                }
            }
        }
    }

    session.close().await
}
