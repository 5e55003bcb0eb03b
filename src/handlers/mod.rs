pub mod basic;
pub mod ib;
pub mod iq;
pub mod router;
pub mod traits;
pub mod unimplemented;

pub use router::StanzaRouter;
pub use traits::StanzaHandler;
