//! Persistence contracts implemented by `nanopay_storage`.

mod traits;

pub use traits::*;
