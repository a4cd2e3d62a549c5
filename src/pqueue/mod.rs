//! Priority queue.

pub mod lotan_shavit;

pub use lotan_shavit::LotanShavitQueue;
