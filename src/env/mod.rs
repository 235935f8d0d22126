//! Task environment abstractions and concrete implementations.
//!
//! Included environments:
//! - **Arithmetic** ([`arithmetic`]) -- deterministic local arithmetic tasks,
//!   no external dependencies.
//! - **HTTP** ([`http`]) -- any environment served over a small JSON API.

pub mod arithmetic;
pub mod http;
pub mod traits;

pub use arithmetic::{ArithmeticEnv, ArithmeticTask};
pub use http::HttpEnv;
pub use traits::{EnvResponse, Environment};

// ---------------------------------------------------------------------------
// AnyEnv: enum dispatch wrapper for dynamic environment selection
// ---------------------------------------------------------------------------

/// An enum wrapper around all concrete environment types, enabling runtime
/// environment selection without `dyn` (which is incompatible with async trait
/// methods).
#[derive(Debug)]
pub enum AnyEnv {
    Arithmetic(ArithmeticEnv),
    Http(HttpEnv),
}

impl Environment for AnyEnv {
    async fn reset(&mut self, goal: &str) -> anyhow::Result<String> {
        match self {
            Self::Arithmetic(e) => e.reset(goal).await,
            Self::Http(e) => e.reset(goal).await,
        }
    }

    async fn step(&mut self, action: &str) -> anyhow::Result<EnvResponse> {
        match self {
            Self::Arithmetic(e) => e.step(action).await,
            Self::Http(e) => e.step(action).await,
        }
    }
}
