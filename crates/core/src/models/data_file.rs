/// 文件种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFileKind {
    /// 从输入目录读取的数据文件
    Data,
    /// 批次完成时生成的控制文件（.in）
    ControlArtifact,
}

/// 待中继的单个文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    pub name: String,
    pub content: Vec<u8>,
    pub kind: DataFileKind,
}

impl DataFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            kind: DataFileKind::Data,
        }
    }

    /// 控制文件本体写在运行时目录中，消息体为空
    pub fn control_artifact(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: Vec::new(),
            kind: DataFileKind::ControlArtifact,
        }
    }

    pub fn is_control_artifact(&self) -> bool {
        self.kind == DataFileKind::ControlArtifact
    }
}

/// 一个已完成的批次，作为整体交给发布者
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    pub files: Vec<DataFile>,
}

impl Event {
    pub fn new(files: Vec<DataFile>) -> Self {
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// 批次中实际存在于输入目录的文件
    pub fn data_files(&self) -> impl Iterator<Item = &DataFile> {
        self.files.iter().filter(|f| !f.is_control_artifact())
    }

    pub fn control_artifact(&self) -> Option<&DataFile> {
        self.files.iter().find(|f| f.is_control_artifact())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_separates_control_artifact() {
        let event = Event::new(vec![
            DataFile::new("a.dat", "hello"),
            DataFile::new("b.dat", "world"),
            DataFile::control_artifact("grid_example_42.in"),
        ]);

        assert_eq!(event.len(), 3);
        let names: Vec<_> = event.data_files().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.dat", "b.dat"]);
        let artifact = event.control_artifact().unwrap();
        assert_eq!(artifact.name, "grid_example_42.in");
        assert!(artifact.content.is_empty());
    }
}
