use crate::jvm::class_file::ClassFile;
use crate::jvm::{BinaryName, Error, Name};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// The part of a class the hierarchy cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    pub name: BinaryName,
    pub superclass: Option<BinaryName>,
    pub interfaces: Vec<BinaryName>,
    pub is_interface: bool,
}

impl ClassHeader {
    pub fn from_class_file(class_file: &ClassFile) -> Result<ClassHeader, Error> {
        Ok(ClassHeader {
            name: class_file.class_name()?,
            superclass: class_file.super_name()?,
            interfaces: class_file.interface_names()?,
            is_interface: class_file.is_interface(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<ClassHeader, Error> {
        ClassHeader::from_class_file(&ClassFile::parse(bytes)?)
    }
}

/// Source of class headers
pub trait ClassLoader {
    /// Look up a class by name
    ///
    /// Returns `Ok(None)` if this loader doesn't know about the class. Errors are reserved for
    /// classes that were found but could not be read.
    fn load_class_header(&self, name: &BinaryName) -> Result<Option<ClassHeader>, Error>;
}

impl<'a, L: ClassLoader + ?Sized> ClassLoader for &'a L {
    fn load_class_header(&self, name: &BinaryName) -> Result<Option<ClassHeader>, Error> {
        (**self).load_class_header(name)
    }
}

/// Classes provided up front
#[derive(Default)]
pub struct InMemoryClassLoader {
    classes: HashMap<BinaryName, ClassHeader>,
}

impl InMemoryClassLoader {
    pub fn new() -> InMemoryClassLoader {
        InMemoryClassLoader::default()
    }

    pub fn add_header(&mut self, header: ClassHeader) {
        self.classes.insert(header.name.clone(), header);
    }

    pub fn add_class_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.add_header(ClassHeader::from_bytes(bytes)?);
        Ok(())
    }
}

impl ClassLoader for InMemoryClassLoader {
    fn load_class_header(&self, name: &BinaryName) -> Result<Option<ClassHeader>, Error> {
        Ok(self.classes.get(name).cloned())
    }
}

/// Classes stored in an exploded directory tree (`net/example/Foo.class`)
pub struct DirectoryClassLoader {
    root: PathBuf,
}

impl DirectoryClassLoader {
    pub fn new(root: impl Into<PathBuf>) -> DirectoryClassLoader {
        DirectoryClassLoader { root: root.into() }
    }
}

impl ClassLoader for DirectoryClassLoader {
    fn load_class_header(&self, name: &BinaryName) -> Result<Option<ClassHeader>, Error> {
        let mut path = self.root.clone();
        path.extend(name.as_str().split('/'));
        path.set_extension("class");

        match fs::read(&path) {
            Ok(bytes) => {
                log::debug!("Loading {:?} from {}", name, path.display());
                ClassHeader::from_bytes(&bytes).map(Some)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::IoError(err)),
        }
    }
}

/// Sequence of loaders, queried in order until one of them knows the class
pub struct ClassPath {
    loaders: Vec<Box<dyn ClassLoader>>,
}

impl ClassPath {
    pub fn new(loaders: Vec<Box<dyn ClassLoader>>) -> ClassPath {
        ClassPath { loaders }
    }

    /// Core JDK classes followed by the given directories and archives (`.jar`, `.zip`, `.jmod`)
    pub fn with_entries(entries: impl IntoIterator<Item = PathBuf>) -> Result<ClassPath, Error> {
        let mut class_path = ClassPath::new(vec![Box::new(super::JdkClassLoader::new())]);
        for entry in entries {
            if entry.is_dir() {
                class_path.push(Box::new(DirectoryClassLoader::new(entry)));
            } else {
                class_path.push(Box::new(super::JarClassLoader::new(entry)?));
            }
        }
        Ok(class_path)
    }

    pub fn push(&mut self, loader: Box<dyn ClassLoader>) {
        self.loaders.push(loader);
    }
}

impl ClassLoader for ClassPath {
    fn load_class_header(&self, name: &BinaryName) -> Result<Option<ClassHeader>, Error> {
        for loader in &self.loaders {
            if let Some(header) = loader.load_class_header(name)? {
                return Ok(Some(header));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_loader_wins() {
        let name = BinaryName::from_string(String::from("app/Widget")).unwrap();
        let header = |superclass: BinaryName| ClassHeader {
            name: name.clone(),
            superclass: Some(superclass),
            interfaces: vec![],
            is_interface: false,
        };
        let mut first = InMemoryClassLoader::new();
        first.add_header(header(BinaryName::THREAD));
        let mut second = InMemoryClassLoader::new();
        second.add_header(header(BinaryName::OBJECT));

        let class_path = ClassPath::new(vec![Box::new(first), Box::new(second)]);
        let loaded = class_path.load_class_header(&name).unwrap().unwrap();
        assert_eq!(loaded.superclass, Some(BinaryName::THREAD));
        assert_eq!(class_path.load_class_header(&BinaryName::STRING).unwrap(), None);
    }

    #[test]
    fn class_path_entries_must_exist() {
        let missing = std::env::temp_dir().join("jvmhook-no-such-archive.jar");
        assert!(matches!(
            ClassPath::with_entries(vec![missing]),
            Err(Error::IoError(_))
        ));
        let class_path = ClassPath::with_entries(vec![std::env::temp_dir()]).unwrap();
        assert!(class_path.load_class_header(&BinaryName::STRING).unwrap().is_some());
    }

    #[test]
    fn missing_directory_entries() {
        let loader = DirectoryClassLoader::new(std::env::temp_dir().join("jvmhook-no-such-dir"));
        assert_eq!(loader.load_class_header(&BinaryName::OBJECT).unwrap(), None);
    }
}
