//! Scenario-based testing with oracle verification.
//!
//! A scenario names an inviter and an invitee, scripts what they do after
//! the handshake, and must end with an oracle that checks the resulting
//! [`World`]. There is no way to run a scenario without one.
//!
//! ```ignore
//! Scenario::new("greeting")
//!     .inviter("alice")
//!     .invitee("bob")
//!     .send("alice", "hello")
//!     .deliver()
//!     .oracle(Box::new(|world| {
//!         assert_eq!(world.deliveries()[0].received.as_deref(), Ok("hello"));
//!         Ok(())
//!     }))
//!     .run()
//!     .await
//! ```

mod builder;
mod world;

pub use builder::{RunnableScenario, Scenario, Step};
pub use world::{Delivery, World};

/// Oracle verifying the final world state.
pub type OracleFn = Box<dyn FnOnce(&World) -> Result<(), String> + Send>;
