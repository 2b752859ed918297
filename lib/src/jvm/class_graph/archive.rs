use super::{ClassHeader, ClassLoader};
use crate::jvm::{BinaryName, Error, Name};
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::ZipArchive;

/// Classes stored in a zip archive
///
/// Plain jars keep classes at the root of the archive. A `.jmod` is a zip with a short header
/// in front and classes under `classes/`.
pub struct JarClassLoader {
    path: PathBuf,
    prefix: &'static str,

    /// Reading an entry needs a mutable archive, but loaders are shared
    archive: RefCell<ZipArchive<File>>,
}

impl JarClassLoader {
    pub fn new(path: impl Into<PathBuf>) -> Result<JarClassLoader, Error> {
        let path = path.into();
        let prefix = if path.extension().map_or(false, |ext| ext == "jmod") {
            "classes/"
        } else {
            ""
        };
        let file = File::open(&path)?;
        let archive = ZipArchive::new(file).map_err(zip_error)?;
        log::debug!("Opened {} ({} entries)", path.display(), archive.len());
        Ok(JarClassLoader {
            path,
            prefix,
            archive: RefCell::new(archive),
        })
    }
}

impl ClassLoader for JarClassLoader {
    fn load_class_header(&self, name: &BinaryName) -> Result<Option<ClassHeader>, Error> {
        let entry = format!("{}{}.class", self.prefix, name.as_str());
        let mut archive = self.archive.borrow_mut();
        let mut file = match archive.by_name(&entry) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => return Err(zip_error(err)),
        };

        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        log::debug!("Loading {:?} from {}", name, self.path.display());
        ClassHeader::from_bytes(&bytes).map(Some)
    }
}

fn zip_error(err: ZipError) -> Error {
    Error::IoError(io::Error::from(err))
}

/// Loaders for the class library of an installed JDK
///
/// Modular JDKs ship their classes as `jmods/*.jmod`, older ones as `jre/lib/rt.jar` (or
/// `lib/rt.jar` when pointed at the JRE itself).
pub fn jdk_class_loaders(java_home: &Path) -> Result<Vec<Box<dyn ClassLoader>>, Error> {
    let jmods = java_home.join("jmods");
    if jmods.is_dir() {
        let mut modules = vec![];
        for entry in fs::read_dir(&jmods)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "jmod") {
                modules.push(path);
            }
        }
        // `java.base` answers almost every lookup
        modules.sort_by_key(|path| !path.ends_with("java.base.jmod"));

        let mut loaders: Vec<Box<dyn ClassLoader>> = vec![];
        for module in modules {
            loaders.push(Box::new(JarClassLoader::new(module)?));
        }
        return Ok(loaders);
    }

    for rt_jar in ["jre/lib/rt.jar", "lib/rt.jar"] {
        let path = java_home.join(rt_jar);
        if path.is_file() {
            return Ok(vec![Box::new(JarClassLoader::new(path)?)]);
        }
    }

    Err(Error::IoError(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no jmods or rt.jar under {}", java_home.display()),
    )))
}
