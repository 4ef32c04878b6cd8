// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::services::mining::controller::MinerStats;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

pub async fn spawn_metrics_server(port: u16, stats: Arc<MinerStats>) -> Option<SocketAddr> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!("Metrics server failed to bind: {}", e);
            return None;
        }
    };

    let local = listener.local_addr().ok();
    if let Some(addr) = local {
        tracing::info!("Metrics server listening on {}", addr);
    }

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let body = render_metrics(&stats);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
                Err(e) => {
                    tracing::warn!("Metrics accept error: {}", e);
                    continue;
                }
            }
        }
    });

    local
}

fn render_metrics(stats: &Arc<MinerStats>) -> String {
    format!(
        concat!(
            "# TYPE miner_cycles counter\nminer_cycles {}\n",
            "# TYPE miner_gated counter\nminer_gated {}\n",
            "# TYPE miner_skipped counter\nminer_skipped {}\n",
            "# TYPE miner_submitted counter\nminer_submitted {}\n",
            "# TYPE miner_failed counter\nminer_failed {}\n"
        ),
        stats.cycles.load(Ordering::Relaxed),
        stats.gated.load(Ordering::Relaxed),
        stats.skipped.load(Ordering::Relaxed),
        stats.submitted.load(Ordering::Relaxed),
        stats.failed.load(Ordering::Relaxed),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metrics_endpoint_serves() {
        let stats = Arc::new(MinerStats::default());
        stats.cycles.fetch_add(3, Ordering::Relaxed);

        let addr = spawn_metrics_server(0, stats.clone())
            .await
            .expect("bind metrics");

        let body = reqwest::get(format!("http://{}", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(body.contains("miner_cycles 3"));
        assert!(body.contains("miner_submitted"));
    }
}
