pub mod architecture;
pub mod error;
pub mod gguf;
pub mod rnnlm;
pub mod vocab;

pub use architecture::{RecurrentLm, StepOutput};
pub use error::{ModelError, Result};
pub use rnnlm::{CellType, RnnLmConfig, RnnLmModel};
pub use vocab::Vocab;
