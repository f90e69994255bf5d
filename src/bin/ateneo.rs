use anyhow::Result;
use ateneo::cli::{actions, actions::Action, start};

#[tokio::main]
async fn main() -> Result<()> {
    let (action, globals) = start()?;

    match action {
        Action::Server(_) => actions::server::handle(action, &globals).await?,
    }

    Ok(())
}
