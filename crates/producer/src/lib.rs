//! 生产端：目录扫描、批次累加、控制文件生成与消息发布

pub mod accumulator;
pub mod control_file;
pub mod producer;
pub mod publisher;

pub use accumulator::BatchAccumulator;
pub use control_file::{render_control_artifact, ControlArtifactGenerator, ControlFileGenerator};
pub use producer::Producer;
pub use publisher::{PublishPolicy, Publisher};
