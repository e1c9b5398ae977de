pub mod filter_sdp;
pub mod talk;
