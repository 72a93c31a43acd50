pub mod init;
pub mod termination;
