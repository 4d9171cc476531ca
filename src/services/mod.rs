pub mod conversation_clock;
pub mod delivery;
pub mod dispatch_service;
pub mod dispatcher;
pub mod identity_service;
pub mod progress;
pub mod verification_service;
