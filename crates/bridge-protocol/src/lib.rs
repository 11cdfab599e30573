//! Wire formats shared by the bridge server and its clients.

pub mod error;

// framed JSON spoken with the browser host over stdio
pub mod host_frame;

pub mod models;

// RPC control plane between clients and the bridge
pub mod rpc;
pub mod rpc_client;
