pub mod input;

pub use input::{ClickKind, DryRunAction, DryRunInjector, InjectionTarget, InputInjector};
