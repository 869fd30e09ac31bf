pub mod health;
pub mod jobs;
pub mod standings;
pub mod system;
