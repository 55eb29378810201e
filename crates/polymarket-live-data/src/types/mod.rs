/*
[INPUT]:  Wire schema definitions and serde requirements
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions shared by codec, registry and callers
[UPDATE]: When the wire schema changes or new types added
*/

pub mod auth;
pub mod envelope;
pub mod payloads;
pub mod subscription;

pub use auth::{ClobApiKeyCreds, Credentials, GammaAuth};
pub use envelope::Envelope;
pub use payloads::{Comment, ParentEntityType, Payload, Reaction, Trade, TradeSide};
pub use subscription::{Subscription, SubscriptionIdentity, SubscriptionKey, TypeSelector};
