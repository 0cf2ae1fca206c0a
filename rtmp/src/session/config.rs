/// Tunables for a publishing session.
#[derive(Clone)]
pub struct SessionConfig {
    /// The server version string advertised as `fmsVer` in the connect
    /// response.
    pub server_version: String,

    /// The window we advertise to the client with the initial
    /// WindowAckSize message.
    pub window_ack_size: u32,

    /// The bandwidth cap sent in the SetPeerBandwidth message.
    pub peer_bandwidth: u32,

    /// The outbound chunk size the server raises itself to at connect; the
    /// protocol default of 128 is wastefully small for media.
    pub outbound_chunk_size: u32,
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig {
            server_version: "Inlet/1,0,0,0".to_string(),
            window_ack_size: 2_500_000,
            peer_bandwidth: 2_500_000,
            outbound_chunk_size: 1024,
        }
    }
}
