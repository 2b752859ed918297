use super::{ClassHeader, ClassLoader};
use crate::jvm::{BinaryName, Error, Name};
use std::collections::HashMap;

struct JdkClass {
    name: &'static str,
    superclass: Option<&'static str>,
    interfaces: &'static [&'static str],
    is_interface: bool,
}

const fn class(
    name: &'static str,
    superclass: &'static str,
    interfaces: &'static [&'static str],
) -> JdkClass {
    JdkClass {
        name,
        superclass: Some(superclass),
        interfaces,
        is_interface: false,
    }
}

const fn interface(name: &'static str, interfaces: &'static [&'static str]) -> JdkClass {
    JdkClass {
        name,
        superclass: Some("java/lang/Object"),
        interfaces,
        is_interface: true,
    }
}

const OBJECT: &str = "java/lang/Object";
const SERIALIZABLE: &str = "java/io/Serializable";
const COMPARABLE: &str = "java/lang/Comparable";

/// Core classes likely to flow through hooked methods
///
/// Bodies that mix types outside of this table need the classpath to be configured.
const JDK_CLASSES: &[JdkClass] = &[
    // java.lang
    JdkClass {
        name: OBJECT,
        superclass: None,
        interfaces: &[],
        is_interface: false,
    },
    interface(SERIALIZABLE, &[]),
    interface(COMPARABLE, &[]),
    interface("java/lang/CharSequence", &[]),
    interface("java/lang/Appendable", &[]),
    interface("java/lang/Cloneable", &[]),
    interface("java/lang/Runnable", &[]),
    interface("java/lang/AutoCloseable", &[]),
    interface("java/lang/Iterable", &[]),
    class(
        "java/lang/String",
        OBJECT,
        &[SERIALIZABLE, COMPARABLE, "java/lang/CharSequence"],
    ),
    class(
        "java/lang/AbstractStringBuilder",
        OBJECT,
        &["java/lang/Appendable", "java/lang/CharSequence"],
    ),
    class(
        "java/lang/StringBuilder",
        "java/lang/AbstractStringBuilder",
        &[SERIALIZABLE, "java/lang/CharSequence"],
    ),
    class("java/lang/Class", OBJECT, &[SERIALIZABLE]),
    class("java/lang/ClassLoader", OBJECT, &[]),
    class("java/lang/Thread", OBJECT, &["java/lang/Runnable"]),
    class("java/lang/Number", OBJECT, &[SERIALIZABLE]),
    class("java/lang/Byte", "java/lang/Number", &[COMPARABLE]),
    class("java/lang/Short", "java/lang/Number", &[COMPARABLE]),
    class("java/lang/Integer", "java/lang/Number", &[COMPARABLE]),
    class("java/lang/Long", "java/lang/Number", &[COMPARABLE]),
    class("java/lang/Float", "java/lang/Number", &[COMPARABLE]),
    class("java/lang/Double", "java/lang/Number", &[COMPARABLE]),
    class("java/lang/Boolean", OBJECT, &[SERIALIZABLE, COMPARABLE]),
    class("java/lang/Character", OBJECT, &[SERIALIZABLE, COMPARABLE]),
    class("java/lang/Void", OBJECT, &[]),
    class("java/lang/Enum", OBJECT, &[SERIALIZABLE, COMPARABLE]),
    // throwables
    class("java/lang/Throwable", OBJECT, &[SERIALIZABLE]),
    class("java/lang/Exception", "java/lang/Throwable", &[]),
    class("java/lang/Error", "java/lang/Throwable", &[]),
    class("java/lang/RuntimeException", "java/lang/Exception", &[]),
    class("java/lang/IllegalArgumentException", "java/lang/RuntimeException", &[]),
    class("java/lang/IllegalStateException", "java/lang/RuntimeException", &[]),
    class("java/lang/NullPointerException", "java/lang/RuntimeException", &[]),
    class("java/lang/ClassCastException", "java/lang/RuntimeException", &[]),
    class("java/lang/ArithmeticException", "java/lang/RuntimeException", &[]),
    class("java/lang/UnsupportedOperationException", "java/lang/RuntimeException", &[]),
    class("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException", &[]),
    class(
        "java/lang/ArrayIndexOutOfBoundsException",
        "java/lang/IndexOutOfBoundsException",
        &[],
    ),
    class("java/lang/ReflectiveOperationException", "java/lang/Exception", &[]),
    class("java/lang/ClassNotFoundException", "java/lang/ReflectiveOperationException", &[]),
    class("java/lang/NoSuchMethodException", "java/lang/ReflectiveOperationException", &[]),
    class("java/lang/IllegalAccessException", "java/lang/ReflectiveOperationException", &[]),
    class(
        "java/lang/reflect/InvocationTargetException",
        "java/lang/ReflectiveOperationException",
        &[],
    ),
    class("java/lang/LinkageError", "java/lang/Error", &[]),
    class("java/lang/NoClassDefFoundError", "java/lang/LinkageError", &[]),
    class("java/lang/ExceptionInInitializerError", "java/lang/LinkageError", &[]),
    class("java/io/IOException", "java/lang/Exception", &[]),
    // java.lang.reflect
    interface("java/lang/reflect/AnnotatedElement", &[]),
    interface("java/lang/reflect/Member", &[]),
    interface(
        "java/lang/reflect/GenericDeclaration",
        &["java/lang/reflect/AnnotatedElement"],
    ),
    class(
        "java/lang/reflect/AccessibleObject",
        OBJECT,
        &["java/lang/reflect/AnnotatedElement"],
    ),
    class(
        "java/lang/reflect/Executable",
        "java/lang/reflect/AccessibleObject",
        &["java/lang/reflect/Member", "java/lang/reflect/GenericDeclaration"],
    ),
    class("java/lang/reflect/Method", "java/lang/reflect/Executable", &[]),
    class(
        "java/lang/reflect/Field",
        "java/lang/reflect/AccessibleObject",
        &["java/lang/reflect/Member"],
    ),
    // java.lang.ref
    class("java/lang/ref/Reference", OBJECT, &[]),
    class("java/lang/ref/SoftReference", "java/lang/ref/Reference", &[]),
    class("java/lang/ref/WeakReference", "java/lang/ref/Reference", &[]),
    // java.util
    interface("java/util/Collection", &["java/lang/Iterable"]),
    interface("java/util/List", &["java/util/Collection"]),
    interface("java/util/Set", &["java/util/Collection"]),
    interface("java/util/Map", &[]),
    interface("java/util/RandomAccess", &[]),
    class("java/util/AbstractCollection", OBJECT, &["java/util/Collection"]),
    class(
        "java/util/AbstractList",
        "java/util/AbstractCollection",
        &["java/util/List"],
    ),
    class(
        "java/util/ArrayList",
        "java/util/AbstractList",
        &[
            "java/util/List",
            "java/util/RandomAccess",
            "java/lang/Cloneable",
            SERIALIZABLE,
        ],
    ),
    class("java/util/AbstractSet", "java/util/AbstractCollection", &["java/util/Set"]),
    class(
        "java/util/HashSet",
        "java/util/AbstractSet",
        &["java/util/Set", "java/lang/Cloneable", SERIALIZABLE],
    ),
    class("java/util/AbstractMap", OBJECT, &["java/util/Map"]),
    class(
        "java/util/HashMap",
        "java/util/AbstractMap",
        &["java/util/Map", "java/lang/Cloneable", SERIALIZABLE],
    ),
];

/// Loader for a fixed table of core JDK classes
pub struct JdkClassLoader {
    classes: HashMap<&'static str, &'static JdkClass>,
}

impl JdkClassLoader {
    pub fn new() -> JdkClassLoader {
        JdkClassLoader {
            classes: JDK_CLASSES.iter().map(|class| (class.name, class)).collect(),
        }
    }
}

impl Default for JdkClassLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassLoader for JdkClassLoader {
    fn load_class_header(&self, name: &BinaryName) -> Result<Option<ClassHeader>, Error> {
        Ok(self.classes.get(name.as_str()).map(|class| ClassHeader {
            name: BinaryName::name(class.name),
            superclass: class.superclass.map(BinaryName::name),
            interfaces: class.interfaces.iter().copied().map(BinaryName::name).collect(),
            is_interface: class.is_interface,
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn table_is_closed() {
        // every supertype mentioned in the table is itself in the table
        let loader = JdkClassLoader::new();
        for class in JDK_CLASSES {
            for supertype in class.superclass.iter().chain(class.interfaces) {
                assert!(
                    loader.classes.contains_key(supertype),
                    "{} refers to unknown {}",
                    class.name,
                    supertype
                );
            }
            assert!(BinaryName::check_valid(class.name).is_ok());
        }
    }

    #[test]
    fn unknown_classes() {
        let loader = JdkClassLoader::new();
        let name = BinaryName::from_string(String::from("javax/swing/JFrame")).unwrap();
        assert_eq!(loader.load_class_header(&name).unwrap(), None);
    }
}
