pub mod block;
pub mod client;
pub mod provider;
pub mod textract;

pub use client::OcrClient;
pub use provider::OcrProvider;
