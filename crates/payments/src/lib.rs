//! Nevermined payments / orchestration API client library.
//!
//! Provides the environment table, a REST client for step queries and
//! updates, a Socket.IO (Engine.IO v4) packet codec, WebSocket connection
//! handling with reconnection, and the subscription loop that turns
//! `step-updated` events into [`StepRef`](imagen_core::StepRef)
//! notifications and writes task logs back to the socket.

pub mod api;
pub mod client;
pub mod environment;
pub mod reconnect;
pub mod socketio;
pub mod subscription;

pub use api::{PaymentsApi, PaymentsApiError};
pub use client::{PaymentsSocketClient, PaymentsClientError};
pub use environment::{Endpoints, Environment, EnvironmentError};
pub use subscription::{Subscription, SubscriptionOptions, TaskLogSender};
