use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Start the Prometheus exposition endpoint in the background
pub async fn start_metrics_server(port: u16) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(
        "Starting Prometheus metrics server on http://{}/metrics",
        addr
    );

    tokio::spawn(async move {
        if let Err(e) = serve(listener).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

async fn serve(listener: TcpListener) -> Result<(), std::io::Error> {
    loop {
        let (mut stream, peer) = listener.accept().await?;

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            let read = match stream.read(&mut buffer).await {
                Ok(n) => n,
                Err(e) => {
                    error!("Failed to read metrics request from {}: {}", peer, e);
                    return;
                }
            };

            let request = String::from_utf8_lossy(&buffer[..read]);
            let path = request
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().nth(1))
                .unwrap_or("/");

            let response = if path == "/metrics" {
                render_metrics()
            } else {
                debug!("Metrics server ignoring request for '{}'", path);
                "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_string()
            };

            let _ = stream.write_all(response.as_bytes()).await;
        });
    }
}

fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut body = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut body) {
        error!("Failed to encode metrics: {}", e);
        return "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n".to_string();
    }

    let body = String::from_utf8_lossy(&body);
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_metrics_produces_http_response() {
        crate::metrics::record_outcome_event("fetch-completed");
        let response = render_metrics();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("feedcourier_outcome_events_total"));
    }
}
