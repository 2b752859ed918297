use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods, fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, in their internal slash-separated form
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extract the raw underlying string data
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extract the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(String::from("Unqualified name is empty"))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(UnqualifiedName(Cow::Owned(name)))
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(String::from("Binary name is empty"))
        } else {
            name.split('/').map(UnqualifiedName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

/// Displays the dotted form, the way the name appears in Java source
impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(&self.to_dotted())
    }
}

impl UnqualifiedName {
    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");

    // JDK names
    pub const APPEND: Self = Self::name("append");
    pub const BOOLEANVALUE: Self = Self::name("booleanValue");
    pub const BYTEVALUE: Self = Self::name("byteValue");
    pub const CHARVALUE: Self = Self::name("charValue");
    pub const DOUBLEVALUE: Self = Self::name("doubleValue");
    pub const FINDENABLEDPLUGIN: Self = Self::name("findEnabledPlugin");
    pub const FLOATVALUE: Self = Self::name("floatValue");
    pub const GETCLASSLOADER: Self = Self::name("getClassLoader");
    pub const GETCONTEXTCLASSLOADER: Self = Self::name("getContextClassLoader");
    pub const GETID: Self = Self::name("getId");
    pub const GETINSTANCE: Self = Self::name("getInstance");
    pub const GETMETHOD: Self = Self::name("getMethod");
    pub const GETPLUGINCLASSLOADER: Self = Self::name("getPluginClassLoader");
    pub const GETSYSTEMCLASSLOADER: Self = Self::name("getSystemClassLoader");
    pub const CURRENTTHREAD: Self = Self::name("currentThread");
    pub const INTVALUE: Self = Self::name("intValue");
    pub const INVOKE: Self = Self::name("invoke");
    pub const ISINSTANCE: Self = Self::name("isInstance");
    pub const LOADCLASS: Self = Self::name("loadClass");
    pub const LONGVALUE: Self = Self::name("longValue");
    pub const SHORTVALUE: Self = Self::name("shortValue");
    pub const TOSTRING: Self = Self::name("toString");
    pub const TYPE: Self = Self::name("TYPE");
    pub const VALUEOF: Self = Self::name("valueOf");
}

impl BinaryName {
    pub(crate) const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    /// Parse a name written the way Java source writes it (`java.lang.Object`)
    pub fn from_dotted(name: &str) -> Result<BinaryName, String> {
        BinaryName::from_string(name.replace('.', "/"))
    }

    /// Render the name the way Java source writes it (`java.lang.Object`)
    pub fn to_dotted(&self) -> String {
        self.as_str().replace('/', ".")
    }

    // JDK names
    pub const BOOLEAN: Self = Self::name("java/lang/Boolean");
    pub const BYTE: Self = Self::name("java/lang/Byte");
    pub const CHARACTER: Self = Self::name("java/lang/Character");
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const CLASSLOADER: Self = Self::name("java/lang/ClassLoader");
    pub const CLONEABLE: Self = Self::name("java/lang/Cloneable");
    pub const DOUBLE: Self = Self::name("java/lang/Double");
    pub const FLOAT: Self = Self::name("java/lang/Float");
    pub const INTEGER: Self = Self::name("java/lang/Integer");
    pub const LONG: Self = Self::name("java/lang/Long");
    pub const METHOD: Self = Self::name("java/lang/reflect/Method");
    pub const METHODHANDLE: Self = Self::name("java/lang/invoke/MethodHandle");
    pub const METHODTYPE: Self = Self::name("java/lang/invoke/MethodType");
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const REFERENCE: Self = Self::name("java/lang/ref/Reference");
    pub const SERIALIZABLE: Self = Self::name("java/io/Serializable");
    pub const SHORT: Self = Self::name("java/lang/Short");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const STRINGBUILDER: Self = Self::name("java/lang/StringBuilder");
    pub const THREAD: Self = Self::name("java/lang/Thread");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");

    // IntelliJ platform names (plugin class loader lookup)
    pub const PLUGINMANAGER: Self = Self::name("com/intellij/ide/plugins/PluginManager");
    pub const PLUGINID: Self = Self::name("com/intellij/openapi/extensions/PluginId");
    pub const IDEAPLUGINDESCRIPTOR: Self =
        Self::name("com/intellij/ide/plugins/IdeaPluginDescriptor");
    pub const PLUGINDESCRIPTOR: Self =
        Self::name("com/intellij/openapi/extensions/PluginDescriptor");
}
