//! Class hierarchy, populated lazily from class loaders
//!
//! Frame inference needs to merge class types, which means it needs to know which classes extend
//! which. The [`ClassGraph`] answers that by loading class headers on demand from a
//! [`ClassLoader`] and interning them in an arena: once a class has been resolved, it is
//! represented by a [`ClassId`] whose identity is pointer identity.

use crate::jvm::verifier::TypeHierarchy;
use crate::jvm::{BinaryName, Error, Name};
use crate::util::RefId;
use elsa::map::FrozenMap;
use std::fmt;
use std::fmt::Debug;
use typed_arena::Arena;

mod archive;
mod assignable;
mod java_classes;
mod loader;

pub use archive::*;
pub use assignable::*;
pub use java_classes::*;
pub use loader::*;

pub struct ClassGraphArenas<'g> {
    class_arena: Arena<ClassData<'g>>,
}

impl<'g> ClassGraphArenas<'g> {
    pub fn new() -> Self {
        ClassGraphArenas {
            class_arena: Arena::new(),
        }
    }
}

impl<'g> Default for ClassGraphArenas<'g> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved class, compared by identity
pub type ClassId<'g> = RefId<'g, ClassData<'g>>;

pub struct ClassData<'g> {
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<ClassId<'g>>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: Vec<ClassId<'g>>,

    pub is_interface: bool,
}

impl<'g> Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

impl<'g> ClassId<'g> {
    pub fn is_interface(&self) -> bool {
        self.0.is_interface
    }

    /// Iterate over the class followed by all of its superclasses
    pub fn superclasses(self) -> impl Iterator<Item = ClassId<'g>> {
        std::iter::successors(Some(self), |class| class.0.superclass)
    }
}

/// Classes loaded so far
///
/// Lookups that miss go to the loader. A class can only be interned after all of its supertypes
/// are, so a class that (indirectly) extends itself is reported as
/// [`Error::ClassHierarchyCycle`] instead of looping forever.
pub struct ClassGraph<'g> {
    arenas: &'g ClassGraphArenas<'g>,
    classes: FrozenMap<BinaryName, Box<ClassId<'g>>>,
    loader: Box<dyn ClassLoader + 'g>,
}

impl<'g> ClassGraph<'g> {
    /// New empty graph backed by a loader
    pub fn new(arenas: &'g ClassGraphArenas<'g>, loader: Box<dyn ClassLoader + 'g>) -> Self {
        ClassGraph {
            arenas,
            classes: FrozenMap::new(),
            loader,
        }
    }

    /// Graph which only knows about core JDK classes
    pub fn with_jdk_classes(arenas: &'g ClassGraphArenas<'g>) -> Self {
        ClassGraph::new(arenas, Box::new(JdkClassLoader::new()))
    }

    /// Find a class, loading it (and its supertypes) if it isn't in the graph yet
    pub fn resolve(&self, name: &BinaryName) -> Result<ClassId<'g>, Error> {
        let mut in_progress = vec![];
        self.resolve_tracking(name, &mut in_progress)
    }

    fn resolve_tracking(
        &self,
        name: &BinaryName,
        in_progress: &mut Vec<BinaryName>,
    ) -> Result<ClassId<'g>, Error> {
        if let Some(class) = self.classes.get(name) {
            return Ok(*class);
        }
        if in_progress.contains(name) {
            return Err(Error::ClassHierarchyCycle(name.clone()));
        }

        let header = self
            .loader
            .load_class_header(name)?
            .ok_or_else(|| Error::MissingClass(name.clone()))?;
        if &header.name != name {
            return Err(Error::Malformed(format!(
                "loading {:?} produced class {:?}",
                name, header.name
            )));
        }
        log::trace!("Adding {:?} to the class graph", name);

        in_progress.push(name.clone());
        let superclass = header
            .superclass
            .as_ref()
            .map(|superclass| self.resolve_tracking(superclass, in_progress))
            .transpose()?;
        let interfaces = header
            .interfaces
            .iter()
            .map(|interface| self.resolve_tracking(interface, in_progress))
            .collect::<Result<Vec<_>, Error>>()?;
        in_progress.pop();

        let data: &'g ClassData<'g> = self.arenas.class_arena.alloc(ClassData {
            name: header.name,
            superclass,
            interfaces,
            is_interface: header.is_interface,
        });
        let class = RefId(data);
        self.classes.insert(name.clone(), Box::new(class));
        Ok(class)
    }
}

/// Common superclass, picked the same way as ASM's `ClassWriter.getCommonSuperClass`
///
///   - if either class is assignable to the other, the more general one
///   - otherwise, if either is an interface, `java/lang/Object`
///   - otherwise, the first superclass of `class1` to which `class2` is assignable
impl<'g> TypeHierarchy for ClassGraph<'g> {
    fn common_superclass(
        &self,
        class1: &BinaryName,
        class2: &BinaryName,
    ) -> Result<BinaryName, Error> {
        let class1 = self.resolve(class1)?;
        let class2 = self.resolve(class2)?;

        if class2.is_assignable(&class1) {
            return Ok(class1.name.clone());
        }
        if class1.is_assignable(&class2) {
            return Ok(class2.name.clone());
        }
        if class1.is_interface() || class2.is_interface() {
            return Ok(BinaryName::OBJECT);
        }
        Ok(class1
            .superclasses()
            .find(|ancestor| class2.is_assignable(ancestor))
            .map_or(BinaryName::OBJECT, |ancestor| ancestor.name.clone()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(String::from(name)).unwrap()
    }

    fn header(class: &str, superclass: &str, interfaces: &[&str]) -> ClassHeader {
        ClassHeader {
            name: name(class),
            superclass: Some(name(superclass)),
            interfaces: interfaces.iter().map(|i| name(i)).collect(),
            is_interface: false,
        }
    }

    fn graph_with<'g>(
        arenas: &'g ClassGraphArenas<'g>,
        classes: Vec<ClassHeader>,
    ) -> ClassGraph<'g> {
        let mut in_memory = InMemoryClassLoader::new();
        for class in classes {
            in_memory.add_header(class);
        }
        let loader = ClassPath::new(vec![Box::new(in_memory), Box::new(JdkClassLoader::new())]);
        ClassGraph::new(arenas, Box::new(loader))
    }

    #[test]
    fn classes_are_interned() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::with_jdk_classes(&arenas);
        let integer1 = graph.resolve(&BinaryName::INTEGER).unwrap();
        let integer2 = graph.resolve(&BinaryName::INTEGER).unwrap();
        assert_eq!(integer1, integer2);

        let number = integer1.superclass.unwrap();
        assert_eq!(number.name.as_str(), "java/lang/Number");
        assert_eq!(number, graph.resolve(&name("java/lang/Number")).unwrap());
    }

    #[test]
    fn jdk_common_superclasses() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::with_jdk_classes(&arenas);
        let common = |a: &str, b: &str| graph.common_superclass(&name(a), &name(b)).unwrap();

        assert_eq!(common("java/lang/Integer", "java/lang/Long").as_str(), "java/lang/Number");
        assert_eq!(
            common("java/lang/IllegalStateException", "java/lang/IllegalArgumentException")
                .as_str(),
            "java/lang/RuntimeException"
        );
        assert_eq!(common("java/lang/String", "java/lang/Integer"), BinaryName::OBJECT);
        assert_eq!(
            common("java/lang/Integer", "java/lang/Comparable").as_str(),
            "java/lang/Comparable"
        );
        assert_eq!(
            common("java/lang/Runnable", "java/lang/Comparable"),
            BinaryName::OBJECT
        );
        assert_eq!(common("java/lang/Throwable", "java/lang/Throwable"), BinaryName::THROWABLE);
    }

    #[test]
    fn user_classes() {
        let arenas = ClassGraphArenas::new();
        let graph = graph_with(
            &arenas,
            vec![
                header("app/Animal", "java/lang/Object", &[]),
                header("app/Dog", "app/Animal", &["java/lang/Runnable"]),
                header("app/Cat", "app/Animal", &[]),
            ],
        );
        let common = |a: &str, b: &str| graph.common_superclass(&name(a), &name(b)).unwrap();
        assert_eq!(common("app/Dog", "app/Cat").as_str(), "app/Animal");
        assert_eq!(common("app/Dog", "java/lang/Runnable").as_str(), "java/lang/Runnable");
        assert_eq!(common("app/Cat", "java/lang/String"), BinaryName::OBJECT);
    }

    #[test]
    fn missing_classes() {
        let arenas = ClassGraphArenas::new();
        let graph = graph_with(&arenas, vec![header("app/Orphan", "app/Gone", &[])]);
        assert!(matches!(
            graph.common_superclass(&name("app/Orphan"), &BinaryName::STRING),
            Err(Error::MissingClass(missing)) if missing.as_str() == "app/Gone"
        ));
    }

    #[test]
    fn cycles() {
        let arenas = ClassGraphArenas::new();
        let graph = graph_with(
            &arenas,
            vec![
                header("app/Chicken", "app/Egg", &[]),
                header("app/Egg", "app/Chicken", &[]),
            ],
        );
        assert!(matches!(
            graph.resolve(&name("app/Egg")),
            Err(Error::ClassHierarchyCycle(_))
        ));
    }
}
