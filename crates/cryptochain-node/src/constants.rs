pub(crate) const DEFAULT_PORT: u16 = 3001;
pub(crate) const PEER_PORT_SPAN: u16 = 1000;
pub(crate) const ROOT_NODE_ADDRESS: &str = "http://localhost:3001";
pub(crate) const DEMO_ROUNDS: usize = 10;
