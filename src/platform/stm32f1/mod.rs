//! STM32F1 platform implementation

pub mod flash;

pub use flash::Stm32f1Flash;
