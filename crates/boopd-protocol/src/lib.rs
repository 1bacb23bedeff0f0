//! Wire codec for the boopd framed text protocol.
//!
//! Every message is a single text frame beginning with a one-byte tag.
//! Integer payloads are unpadded base-36, one to eleven lowercase
//! digits (the widest value fits the 53-bit safe-integer range).
//!
//! | Tag | Direction | Payload | Meaning |
//! |-----|-----------|---------|---------|
//! | `h` | both      | none    | heartbeat / heartbeat ack |
//! | `b` | C→S       | boop id | boop request |
//! | `d` | C→S       | query id| cooldown query |
//! | `b` | S→C       | boop id | boop accepted |
//! | `r` | S→C       | boop id, cooldown ms | boop rejected |
//! | `d` | S→C       | query id \[, cooldown ms\] | cooldown reply |
//! | `c` | S→C       | count   | current global count |
//! | `i` | S→C       | none    | last inbound frame was invalid |
//!
//! Decoding is strict: a frame that does not match one of the shapes
//! above yields a typed [`DecodeError`] and never a partial value.

pub mod base36;
pub mod frame;

pub use frame::{ClientFrame, DecodeError, ServerFrame};
