pub mod backup;
pub mod deployment;
pub mod lifecycle;
pub mod logstream;
pub mod misc;
pub mod publish;
pub mod sync;
