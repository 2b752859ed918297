use super::clinit::{initializer_prefix, new_initializer, prefix_initializer, uses_class_literals};
use super::emitter::HookEmitter;
use super::fields::HookFields;
use super::patcher::{patch_method, PatchContext};
use super::{Error, HookSpec, Settings};
use crate::jvm::class_file::{
    AttributeLike, ClassFile, Code, ConstantsPool, LineNumberTable, LocalVariableTable,
    LocalVariableTypeTable, Method, StackMapTable, Version,
};
use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas, ClassLoader};
use crate::jvm::code::{EncodeContext, MethodCode};
use crate::jvm::verifier::{MethodContext, TypeHierarchy};
use crate::jvm::{self, BinaryName, MethodAccessFlags, MethodDescriptor, Name, UnqualifiedName};
use std::borrow::Cow;
use std::collections::HashMap;

/// Code attributes that get regenerated when a method body is re-encoded
const REGENERATED_ATTRIBUTES: [&str; 4] = [
    LineNumberTable::NAME,
    LocalVariableTable::NAME,
    LocalVariableTypeTable::NAME,
    StackMapTable::NAME,
];

/// Class hierarchy as seen from inside the class being rewritten
///
/// The class being rewritten can't be loaded yet (that's the whole point), so it gets resolved
/// through its declared superclass instead.
pub struct PatchedClassHierarchy<'a> {
    pub this_class: &'a BinaryName,
    pub super_class: Option<BinaryName>,
    pub inner: &'a dyn TypeHierarchy,
}

impl<'a> TypeHierarchy for PatchedClassHierarchy<'a> {
    fn common_superclass(
        &self,
        class1: &BinaryName,
        class2: &BinaryName,
    ) -> Result<BinaryName, jvm::Error> {
        if class1 == class2 {
            return Ok(class1.clone());
        }
        if class2 == self.this_class {
            return self.common_superclass(class2, class1);
        }
        if class1 == self.this_class {
            return match &self.super_class {
                None => Ok(BinaryName::OBJECT),
                Some(super_class) if super_class == self.this_class => {
                    Err(jvm::Error::ClassHierarchyCycle(super_class.clone()))
                }
                Some(super_class) => self.common_superclass(super_class, class2),
            };
        }
        self.inner.common_superclass(class1, class2)
    }
}

/// Add the hook fields, resolve them in the static initializer, and splice hooks into every
/// target method whose trigger matches
pub fn patch_class(
    mut class_file: ClassFile,
    spec: &HookSpec,
    settings: &Settings,
    hierarchy: &dyn TypeHierarchy,
) -> Result<ClassFile, Error> {
    let this_class = class_file.class_name()?;
    if class_file.is_interface() {
        return Err(Error::UnsupportedTarget(format!(
            "{} is an interface",
            this_class
        )));
    }
    if class_file.version < Version::JAVA5
        && uses_class_literals(&spec.interface, &settings.loader_source)
    {
        return Err(Error::UnsupportedTarget(format!(
            "{} has class file version {}.{}, which can't load class constants",
            this_class, class_file.version.major_version, class_file.version.minor_version
        )));
    }

    let fields = HookFields::new(&this_class, &spec.interface)?;
    let emitter = HookEmitter::new(fields.clone(), &spec.interface);
    let hierarchy = PatchedClassHierarchy {
        this_class: &this_class,
        super_class: class_file.super_name()?,
        inner: hierarchy,
    };
    let emit_stack_map =
        class_file.version.supports_stack_map_table() || settings.compute_frames_below_java6;
    let initializer_name = UnqualifiedName::CLINIT;
    let initializer_descriptor = MethodDescriptor {
        parameters: vec![],
        return_type: None,
    };
    let prefix = initializer_prefix(&this_class, &spec.interface, &fields, &settings.loader_source);

    let mut constants = ConstantsPool::from_offset_vec(class_file.constants.clone());
    let mut found_initializer = false;

    for method in &mut class_file.methods {
        let name = method.name(&constants)?.to_owned();
        let descriptor = method.descriptor(&constants)?;
        let is_initializer = name == initializer_name.as_str();
        let target = spec.target(&name, &descriptor);
        if !is_initializer && target.is_none() {
            continue;
        }

        let position = match method.code_attribute_position(&constants)? {
            Some(position) => position,
            None => {
                log::debug!("{}.{} has no code to hook", this_class, name);
                continue;
            }
        };
        let code: Code = method.attributes[position].decode()?;
        let original = MethodCode::decode(&code, &constants)?;

        let (method_name, rewritten) = match target {
            Some(target) => {
                target.check_types(&spec.interface, &hierarchy)?;
                let context = PatchContext {
                    emitter: &emitter,
                    target,
                };
                match patch_method(&context, &original) {
                    Some(rewritten) => (&target.name, rewritten),
                    None => continue,
                }
            }
            None => {
                found_initializer = true;
                (
                    &initializer_name,
                    prefix_initializer(&original, prefix.clone()),
                )
            }
        };

        for attribute in &code.attributes {
            let attribute_name = attribute.name(&constants)?;
            if !REGENERATED_ATTRIBUTES.iter().any(|known| *known == attribute_name) {
                log::warn!(
                    "Dropping {} attribute from the code of {}.{}",
                    attribute_name,
                    this_class,
                    name
                );
            }
        }

        let context = EncodeContext {
            method: MethodContext {
                this_class: &this_class,
                name: method_name,
                descriptor: &descriptor,
                is_static: method.access_flags.contains(MethodAccessFlags::STATIC),
            },
            hierarchy: &hierarchy,
            emit_stack_map,
        };
        let encoded = rewritten.encode(&context, &mut constants)?;
        method.attributes[position] = constants.get_attribute(encoded)?;
    }

    if !found_initializer {
        log::debug!("Creating static initializer for {}", this_class);
        let context = EncodeContext {
            method: MethodContext {
                this_class: &this_class,
                name: &initializer_name,
                descriptor: &initializer_descriptor,
                is_static: true,
            },
            hierarchy: &hierarchy,
            emit_stack_map,
        };
        let encoded = new_initializer(prefix).encode(&context, &mut constants)?;
        class_file.methods.push(Method {
            access_flags: settings.clinit_access_flags,
            name_index: constants.get_utf8(initializer_name.as_str())?,
            descriptor_index: constants.get_utf8("()V")?,
            attributes: vec![constants.get_attribute(encoded)?],
        });
    }

    let declarations = fields.declarations(&mut constants)?;
    class_file.fields.extend(declarations);
    class_file.constants = constants.into_offset_vec();
    Ok(class_file)
}

/// Rewrites the classes it has hooks for and passes everything else through
///
/// ```
/// use jvmhook::hook::{HookSpec, Settings, Target, Transformer, TriggerShape};
/// use jvmhook::jvm::class_graph::JdkClassLoader;
/// use jvmhook::jvm::{BinaryName, Name};
///
/// let spec = HookSpec::new(
///     "net.example.IWriteAccess",
///     "isWrite",
///     "()Z",
///     vec![Target::new("isWrite", "()Z", TriggerShape::Entry { slot: 0 }).unwrap()],
/// )
/// .unwrap();
///
/// let mut transformer = Transformer::new(Settings::new(), Box::new(JdkClassLoader::new()));
/// transformer.add_spec(BinaryName::from_string(String::from("net/example/Usage")).unwrap(), spec);
/// assert!(transformer.is_target(&BinaryName::from_string(String::from("net/example/Usage")).unwrap()));
/// assert!(!transformer.is_target(&BinaryName::STRING));
/// ```
pub struct Transformer {
    specs: HashMap<BinaryName, HookSpec>,
    pub settings: Settings,

    /// Where to find supertypes when computing frames
    class_path: Box<dyn ClassLoader>,
}

impl Transformer {
    pub fn new(settings: Settings, class_path: Box<dyn ClassLoader>) -> Transformer {
        Transformer {
            specs: HashMap::new(),
            settings,
            class_path,
        }
    }

    /// Register the hook for a class, replacing any previous one
    pub fn add_spec(&mut self, class: BinaryName, spec: HookSpec) -> Option<HookSpec> {
        self.specs.insert(class, spec)
    }

    pub fn is_target(&self, class: &BinaryName) -> bool {
        self.specs.contains_key(class)
    }

    /// Rewrite a class image if it is a target, or hand it back untouched
    ///
    /// Targets that already declare the hook fields are also handed back untouched.
    pub fn transform<'b>(&self, bytes: &'b [u8]) -> Result<Cow<'b, [u8]>, Error> {
        let name = ClassFile::peek_class_name(bytes)?;
        let spec = match self.specs.get(&name) {
            Some(spec) => spec,
            None => return Ok(Cow::Borrowed(bytes)),
        };

        let class_file = ClassFile::parse(bytes)?;
        if HookFields::new(&name, &spec.interface)?.declared_by(&class_file)? {
            log::warn!("{} already has hook fields, leaving it alone", name);
            return Ok(Cow::Borrowed(bytes));
        }

        log::info!("Rewriting {}", name);
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas, Box::new(&*self.class_path));
        let patched = patch_class(class_file, spec, &self.settings, &graph)?;
        let output = patched.to_bytes()?;

        if let Some(debug_dir) = &self.settings.debug_output_dir {
            let path = debug_dir.join(format!("{}.class", name.as_str()));
            match patched.save_to_path(&path, true) {
                Ok(()) => log::info!("Wrote {} to {}", name, path.display()),
                Err(err) => log::warn!("Failed to write {}: {}", path.display(), err),
            }
        }

        Ok(Cow::Owned(output))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::JdkClassLoader;

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(String::from(name)).unwrap()
    }

    #[test]
    fn rewritten_class_resolves_through_its_superclass() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::with_jdk_classes(&arenas);
        let this_class = name("app/Counter");
        let hierarchy = PatchedClassHierarchy {
            this_class: &this_class,
            super_class: Some(BinaryName::INTEGER),
            inner: &graph,
        };
        let common = |a: &BinaryName, b: &BinaryName| hierarchy.common_superclass(a, b).unwrap();

        assert_eq!(common(&this_class, &this_class), this_class);
        assert_eq!(
            common(&this_class, &name("java/lang/Long")).as_str(),
            "java/lang/Number"
        );
        assert_eq!(
            common(&name("java/lang/Long"), &this_class).as_str(),
            "java/lang/Number"
        );
        assert_eq!(common(&BinaryName::STRING, &this_class), BinaryName::OBJECT);
        assert_eq!(
            common(&BinaryName::STRING, &BinaryName::INTEGER),
            BinaryName::OBJECT
        );
    }

    #[test]
    fn self_extending_class_is_a_cycle() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::with_jdk_classes(&arenas);
        let this_class = name("app/Loop");
        let hierarchy = PatchedClassHierarchy {
            this_class: &this_class,
            super_class: Some(this_class.clone()),
            inner: &graph,
        };
        assert!(matches!(
            hierarchy.common_superclass(&this_class, &BinaryName::STRING),
            Err(jvm::Error::ClassHierarchyCycle(_))
        ));
    }

    #[test]
    fn other_classes_pass_through() {
        let transformer = Transformer::new(Settings::new(), Box::new(JdkClassLoader::new()));
        let bytes = {
            let mut constants = ConstantsPool::new();
            let this_class = constants.get_utf8("app/Plain").unwrap();
            let this_class = constants.get_class(this_class).unwrap();
            let super_class = constants.get_utf8("java/lang/Object").unwrap();
            let super_class = constants.get_class(super_class).unwrap();
            ClassFile {
                version: Version::JAVA8,
                constants: constants.into_offset_vec(),
                access_flags: jvm::ClassAccessFlags::PUBLIC,
                this_class,
                super_class: Some(super_class),
                interfaces: vec![],
                fields: vec![],
                methods: vec![],
                attributes: vec![],
            }
            .to_bytes()
            .unwrap()
        };
        assert!(matches!(
            transformer.transform(&bytes).unwrap(),
            Cow::Borrowed(passed) if passed == &bytes[..]
        ));
        assert!(matches!(
            transformer.transform(&[0xCA, 0xFE]),
            Err(Error::ClassFile(_))
        ));
    }
}
