/// Connect command functionality
pub mod connect;
/// Session, sign-in and sign-out command functionality
pub mod session;
