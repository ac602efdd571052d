//! Fetches a URL and prints the response.
//!
//! ```sh
//! cargo run --example fetch -- http://127.0.0.1:8080/
//! ```

use std::sync::Arc;

use micro_rest_client::{ClientConfig, Http1Transport, HttpClient};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let url = std::env::args().nth(1).unwrap_or_else(|| "http://127.0.0.1:8080/".to_owned());
    let config = ClientConfig::new().with_request_compressed_response(true);
    let client = match HttpClient::with_config(&url, config, Arc::new(Http1Transport::new())) {
        Ok(client) => client,
        Err(e) => {
            error!(cause = %e, "invalid url");
            return;
        }
    };

    let response = match client.get("") {
        Ok(future) => future.await,
        Err(e) => Err(e),
    };
    match response {
        Ok(response) => {
            let length = response.content_ready().await;
            info!(status = %response.status(), length, "response received");
            println!("{response}");
        }
        Err(e) => error!(cause = %e, "request failed"),
    }
}
