//! NetworkOutput - UDP fire-and-forget streaming

use contracts::{ConsumerId, ContractError, Frame, FrameOutput};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, error, instrument, warn};

/// Serialization format for network transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    /// JSON (human-readable, larger)
    #[default]
    Json,
    /// Bincode (binary, compact)
    Bincode,
}

/// Configuration for NetworkOutput
#[derive(Debug, Clone)]
pub struct NetworkOutputConfig {
    /// Target address
    pub addr: SocketAddr,
    /// Serialization format
    pub format: NetworkFormat,
    /// Datagrams larger than this are dropped
    pub max_packet_size: usize,
}

impl NetworkOutputConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", addr_str, e))?;

        let format = match params.get("format").map(String::as_str) {
            Some("bincode") => NetworkFormat::Bincode,
            Some("json") | None => NetworkFormat::Json,
            Some(other) => return Err(format!("unknown format '{}'", other)),
        };

        let max_packet_size = params
            .get("max_packet_size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(65000);

        Ok(Self {
            addr,
            format,
            max_packet_size,
        })
    }
}

/// Datagram payload: the frame plus the consumer it was delivered to
#[derive(Debug, Serialize)]
pub struct FrameEnvelope<'a> {
    pub consumer: ConsumerId,
    pub frame: &'a Frame,
}

/// Output that sends frames over UDP
pub struct NetworkOutput {
    name: String,
    config: NetworkOutputConfig,
    socket: Option<UdpSocket>,
}

impl NetworkOutput {
    /// Create a new NetworkOutput
    #[instrument(name = "network_output_new", skip(name, config))]
    pub async fn new(
        name: impl Into<String>,
        config: NetworkOutputConfig,
    ) -> std::io::Result<Self> {
        let name = name.into();
        let bind_addr = if config.addr.is_ipv6() {
            "[::]:0"
        } else {
            "0.0.0.0:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(&config.addr).await?;

        debug!(
            output = %name,
            target = %config.addr,
            "NetworkOutput connected"
        );

        Ok(Self {
            name,
            config,
            socket: Some(socket),
        })
    }

    /// Create from params (for factory)
    #[instrument(name = "network_output_from_params", skip(name, params))]
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkOutputConfig::from_params(params)
            .map_err(|e| ContractError::output_emit(&name, e))?;

        Self::new(name.clone(), config)
            .await
            .map_err(|e| ContractError::OutputConnection {
                output_name: name,
                message: e.to_string(),
            })
    }

    fn serialize(&self, envelope: &FrameEnvelope<'_>) -> Result<Vec<u8>, String> {
        match self.config.format {
            NetworkFormat::Json => {
                serde_json::to_vec(envelope).map_err(|e| format!("json error: {}", e))
            }
            NetworkFormat::Bincode => {
                bincode::serialize(envelope).map_err(|e| format!("bincode error: {}", e))
            }
        }
    }

    fn socket(&self) -> Result<&UdpSocket, ContractError> {
        self.socket
            .as_ref()
            .ok_or_else(|| ContractError::output_emit(&self.name, "socket not connected"))
    }

    async fn transmit(&self, socket: &UdpSocket, data: &[u8], frame_index: u64) {
        match socket.send(data).await {
            Ok(sent) => {
                debug!(output = %self.name, frame_index, bytes = sent, "Sent");
            }
            Err(e) => {
                // UDP is best-effort
                error!(output = %self.name, error = %e, "UDP send failed");
            }
        }
    }
}

impl FrameOutput for NetworkOutput {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "network_output_emit",
        skip(self, consumer, frame),
        fields(output = %self.name, frame_index = frame.frame_index())
    )]
    async fn emit(&mut self, consumer: ConsumerId, frame: &Frame) -> Result<(), ContractError> {
        let socket = self.socket()?;
        let data = self
            .serialize(&FrameEnvelope { consumer, frame })
            .map_err(|e| ContractError::output_emit(&self.name, e))?;

        if data.len() > self.config.max_packet_size {
            warn!(
                output = %self.name,
                size = data.len(),
                max = self.config.max_packet_size,
                "Packet too large, dropped"
            );
            return Ok(());
        }

        self.transmit(socket, &data, frame.frame_index()).await;
        Ok(())
    }

    #[instrument(name = "network_output_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "network_output_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.socket = None;
        debug!(output = %self.name, "NetworkOutput closed");
        Ok(())
    }
}
