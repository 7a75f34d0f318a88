mod aggregate;
mod app;
mod config;
mod crm;
mod error;
mod oauth;
mod properties;
mod token_store;
mod types;
mod upsert;

#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() {
    if let Err(err) = app::run().await {
        tracing::error!(error = %err, "videoask bridge terminated");
        std::process::exit(1);
    }
}
