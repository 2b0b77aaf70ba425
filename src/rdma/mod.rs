// VNI authentication resolution and mount-option parsing.
pub mod auth;

// Completion queues and work completions.
pub mod cq;

// Devices and the device registry.
pub mod device;

// The fabric provider contract plus its real and fake implementations.
pub mod fabric;

// 32-bit/64-bit memory key translation.
pub mod key;

// Memory regions and the MR cache.
pub mod mr;

// Protection domains.
pub mod pd;

// Per-device progress engine.
pub mod progress;

// Queue pairs.
pub mod qp;

// Work requests and the operation translator.
pub mod wr;
