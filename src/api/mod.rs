//! HTTP action surface: one route segment selects the action, the query
//! string carries its parameters.

pub mod dispatcher;
pub mod envelope;
pub mod handlers;

pub use dispatcher::{authorize, dispatch, fallback, Action, ActionRequest, Authorization, Params, Requirement};
pub use envelope::{EnvelopeState, Reply, ResponseEnvelope};
