//! Follow a negotiator's inbox, printing each entry as a JSON line.

use std::time::Duration;

use negotiator_client::NegotiatorClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:9000".to_string());
    let from: usize = match std::env::args().nth(2) {
        Some(offset) => offset.parse()?,
        None => 0,
    };

    eprintln!("Following {}/inbox/entries from offset {}", base_url, from);

    let mut client = NegotiatorClient::new(&base_url);
    client.seek(from);

    loop {
        match client.poll().await {
            Ok(entries) => {
                for entry in entries {
                    println!("{}", serde_json::to_string(&entry)?);
                }
            }
            Err(e) => eprintln!("Poll failed at offset {}: {}", client.offset(), e),
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
