//! Static initializer patch
//!
//! The synthetic fields are filled in at the very start of `<clinit>`, before any code that was
//! already there, so that they are set by the time anything else in the class can run.

use super::emitter::load_int;
use super::fields::HookFields;
use super::marshal::ValueMarshal;
use super::spec::InterfaceMethod;
use crate::jvm::code::{
    BranchInstruction, CodeItem, ConstantData, InvokeType, MethodCode, MethodRef, SymInstruction,
};
use crate::jvm::{BinaryName, FieldType, MethodDescriptor, Name, RefType, UnqualifiedName};
use std::fmt;
use std::str::FromStr;

/// Where the static initializer gets the class loader that loads the interface
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoaderSource {
    /// Loader that defined the class being rewritten
    DefiningLoader,

    /// Context class loader of the thread initializing the class
    ContextLoader,

    /// `ClassLoader.getSystemClassLoader()`
    SystemLoader,

    /// Class loader of an IntelliJ platform plugin, found through the plugin manager
    Plugin { plugin_id: String },
}

impl LoaderSource {
    /// Instructions pushing the class loader
    pub fn instructions(&self, this_class: &BinaryName) -> Vec<SymInstruction> {
        let classloader = || Some(FieldType::object(BinaryName::CLASSLOADER));
        match self {
            LoaderSource::DefiningLoader => vec![
                SymInstruction::Ldc(ConstantData::Class(RefType::Object(this_class.clone()))),
                SymInstruction::Invoke(
                    InvokeType::Virtual,
                    method(BinaryName::CLASS, UnqualifiedName::GETCLASSLOADER, vec![], classloader()),
                ),
            ],
            LoaderSource::ContextLoader => vec![
                SymInstruction::Invoke(
                    InvokeType::Static,
                    method(
                        BinaryName::THREAD,
                        UnqualifiedName::CURRENTTHREAD,
                        vec![],
                        Some(FieldType::object(BinaryName::THREAD)),
                    ),
                ),
                SymInstruction::Invoke(
                    InvokeType::Virtual,
                    method(
                        BinaryName::THREAD,
                        UnqualifiedName::GETCONTEXTCLASSLOADER,
                        vec![],
                        classloader(),
                    ),
                ),
            ],
            LoaderSource::SystemLoader => vec![SymInstruction::Invoke(
                InvokeType::Static,
                method(
                    BinaryName::CLASSLOADER,
                    UnqualifiedName::GETSYSTEMCLASSLOADER,
                    vec![],
                    classloader(),
                ),
            )],
            LoaderSource::Plugin { plugin_id } => vec![
                SymInstruction::Invoke(
                    InvokeType::Static,
                    method(
                        BinaryName::PLUGINMANAGER,
                        UnqualifiedName::GETINSTANCE,
                        vec![],
                        Some(FieldType::object(BinaryName::PLUGINMANAGER)),
                    ),
                ),
                SymInstruction::Ldc(ConstantData::String(plugin_id.clone())),
                SymInstruction::Invoke(
                    InvokeType::Static,
                    method(
                        BinaryName::PLUGINID,
                        UnqualifiedName::GETID,
                        vec![FieldType::object(BinaryName::STRING)],
                        Some(FieldType::object(BinaryName::PLUGINID)),
                    ),
                ),
                SymInstruction::Invoke(
                    InvokeType::Virtual,
                    method(
                        BinaryName::PLUGINMANAGER,
                        UnqualifiedName::FINDENABLEDPLUGIN,
                        vec![FieldType::object(BinaryName::PLUGINID)],
                        Some(FieldType::object(BinaryName::IDEAPLUGINDESCRIPTOR)),
                    ),
                ),
                SymInstruction::Invoke(
                    InvokeType::Interface(1),
                    MethodRef::new(
                        BinaryName::PLUGINDESCRIPTOR,
                        UnqualifiedName::GETPLUGINCLASSLOADER,
                        MethodDescriptor {
                            parameters: vec![],
                            return_type: classloader(),
                        },
                        true,
                    ),
                ),
            ],
        }
    }
}

impl Default for LoaderSource {
    fn default() -> LoaderSource {
        LoaderSource::DefiningLoader
    }
}

/// Parses `defining`, `context`, `system`, or `plugin:<id>`
impl FromStr for LoaderSource {
    type Err = String;

    fn from_str(source: &str) -> Result<LoaderSource, String> {
        match source {
            "defining" => Ok(LoaderSource::DefiningLoader),
            "context" => Ok(LoaderSource::ContextLoader),
            "system" => Ok(LoaderSource::SystemLoader),
            _ => match source.strip_prefix("plugin:") {
                Some(plugin_id) if !plugin_id.is_empty() => Ok(LoaderSource::Plugin {
                    plugin_id: plugin_id.to_owned(),
                }),
                _ => Err(format!(
                    "unknown loader '{}' (expected defining, context, system, or plugin:<id>)",
                    source
                )),
            },
        }
    }
}

impl fmt::Display for LoaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderSource::DefiningLoader => f.write_str("defining"),
            LoaderSource::ContextLoader => f.write_str("context"),
            LoaderSource::SystemLoader => f.write_str("system"),
            LoaderSource::Plugin { plugin_id } => write!(f, "plugin:{}", plugin_id),
        }
    }
}

fn method(
    class: BinaryName,
    name: UnqualifiedName,
    parameters: Vec<FieldType<BinaryName>>,
    return_type: Option<FieldType<BinaryName>>,
) -> MethodRef {
    MethodRef::new(
        class,
        name,
        MethodDescriptor {
            parameters,
            return_type,
        },
        false,
    )
}

/// Code that loads the interface, looks up its method, and stores both into the hook fields
pub fn initializer_prefix(
    this_class: &BinaryName,
    interface: &InterfaceMethod,
    fields: &HookFields,
    loader: &LoaderSource,
) -> Vec<CodeItem> {
    let class_type = || FieldType::object(BinaryName::CLASS);
    let mut code = loader.instructions(this_class);

    code.push(SymInstruction::Ldc(ConstantData::String(
        interface.interface.to_dotted(),
    )));
    code.push(SymInstruction::Invoke(
        InvokeType::Virtual,
        method(
            BinaryName::CLASSLOADER,
            UnqualifiedName::LOADCLASS,
            vec![FieldType::object(BinaryName::STRING)],
            Some(class_type()),
        ),
    ));
    code.push(SymInstruction::Dup);
    code.push(SymInstruction::PutStatic(fields.class_field.clone()));

    code.push(SymInstruction::Ldc(ConstantData::String(
        interface.name.as_str().to_owned(),
    )));
    let parameters = &interface.descriptor.parameters;
    code.push(load_int(parameters.len()));
    code.push(SymInstruction::ANewArray(RefType::Object(BinaryName::CLASS)));
    for (index, parameter) in parameters.iter().enumerate() {
        code.push(SymInstruction::Dup);
        code.push(load_int(index));
        code.push(ValueMarshal::new(parameter).class_object());
        code.push(SymInstruction::AAStore);
    }
    code.push(SymInstruction::Invoke(
        InvokeType::Virtual,
        method(
            BinaryName::CLASS,
            UnqualifiedName::GETMETHOD,
            vec![
                FieldType::object(BinaryName::STRING),
                FieldType::array(class_type()),
            ],
            Some(FieldType::object(BinaryName::METHOD)),
        ),
    ));
    code.push(SymInstruction::PutStatic(fields.method_field.clone()));

    code.into_iter().map(CodeItem::Instruction).collect()
}

/// Does the prefix `ldc` any class constants (which class files before Java 5 can't hold)?
pub fn uses_class_literals(interface: &InterfaceMethod, loader: &LoaderSource) -> bool {
    *loader == LoaderSource::DefiningLoader
        || interface
            .descriptor
            .parameters
            .iter()
            .any(|parameter| matches!(parameter, FieldType::Ref(_)))
}

/// Run `prefix` before the rest of an existing static initializer
pub fn prefix_initializer(code: &MethodCode, prefix: Vec<CodeItem>) -> MethodCode {
    let mut items = prefix;
    items.extend(code.items.iter().cloned());
    MethodCode {
        items,
        ..code.clone()
    }
}

/// Static initializer that runs `prefix` and returns
pub fn new_initializer(prefix: Vec<CodeItem>) -> MethodCode {
    let mut code = MethodCode::new();
    code.items = prefix;
    code.items.push(CodeItem::Branch(BranchInstruction::Return));
    code
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::FieldRef;
    use crate::jvm::parse_descriptor;

    fn setup(descriptor: &str) -> (BinaryName, InterfaceMethod, HookFields) {
        let this_class = BinaryName::from_string(String::from("app/Target")).unwrap();
        let interface = InterfaceMethod {
            interface: BinaryName::from_dotted("app.IHook").unwrap(),
            name: UnqualifiedName::from_string(String::from("hook")).unwrap(),
            descriptor: parse_descriptor(descriptor).unwrap(),
        };
        let fields = HookFields::new(&this_class, &interface).unwrap();
        (this_class, interface, fields)
    }

    fn instructions(items: &[CodeItem]) -> Vec<&SymInstruction> {
        items
            .iter()
            .filter_map(|item| match item {
                CodeItem::Instruction(insn) => Some(insn),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn loader_sources_parse() {
        assert_eq!("defining".parse::<LoaderSource>(), Ok(LoaderSource::DefiningLoader));
        assert_eq!("system".parse::<LoaderSource>(), Ok(LoaderSource::SystemLoader));
        assert_eq!(
            "plugin:net.earthcomputer.classfileindexer".parse::<LoaderSource>(),
            Ok(LoaderSource::Plugin {
                plugin_id: String::from("net.earthcomputer.classfileindexer")
            })
        );
        assert!("plugin:".parse::<LoaderSource>().is_err());
        assert!("bootstrap".parse::<LoaderSource>().is_err());

        let source = LoaderSource::Plugin {
            plugin_id: String::from("x"),
        };
        assert_eq!(source.to_string().parse::<LoaderSource>(), Ok(source));
    }

    #[test]
    fn plugin_loader_chain() {
        let this_class = BinaryName::from_string(String::from("app/Target")).unwrap();
        let source = LoaderSource::Plugin {
            plugin_id: String::from("my.plugin"),
        };
        let code = source.instructions(&this_class);
        assert_eq!(code.len(), 5);
        assert_eq!(
            code[1],
            SymInstruction::Ldc(ConstantData::String(String::from("my.plugin")))
        );
        match &code[4] {
            SymInstruction::Invoke(InvokeType::Interface(1), method) => {
                assert!(method.is_interface);
                assert_eq!(method.name, UnqualifiedName::GETPLUGINCLASSLOADER);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn prefix_resolves_interface_then_method() {
        let (this_class, interface, fields) = setup("(JLjava/lang/String;)Z");
        let prefix = initializer_prefix(&this_class, &interface, &fields, &LoaderSource::SystemLoader);
        let code = instructions(&prefix);

        let class_type = |name: &str| FieldType::<BinaryName>::object(BinaryName::from_string(name.to_owned()).unwrap());
        let expected_tail = vec![
            SymInstruction::Ldc(ConstantData::String(String::from("app.IHook"))),
            SymInstruction::Invoke(
                InvokeType::Virtual,
                MethodRef::new(
                    BinaryName::CLASSLOADER,
                    UnqualifiedName::LOADCLASS,
                    parse_descriptor("(Ljava/lang/String;)Ljava/lang/Class;").unwrap(),
                    false,
                ),
            ),
            SymInstruction::Dup,
            SymInstruction::PutStatic(fields.class_field.clone()),
            SymInstruction::Ldc(ConstantData::String(String::from("hook"))),
            SymInstruction::IConst2,
            SymInstruction::ANewArray(RefType::Object(BinaryName::CLASS)),
            SymInstruction::Dup,
            SymInstruction::IConst0,
            SymInstruction::GetStatic(FieldRef::new(
                BinaryName::LONG,
                UnqualifiedName::TYPE,
                class_type("java/lang/Class"),
            )),
            SymInstruction::AAStore,
            SymInstruction::Dup,
            SymInstruction::IConst1,
            SymInstruction::Ldc(ConstantData::Class(RefType::Object(BinaryName::STRING))),
            SymInstruction::AAStore,
            SymInstruction::Invoke(
                InvokeType::Virtual,
                MethodRef::new(
                    BinaryName::CLASS,
                    UnqualifiedName::GETMETHOD,
                    parse_descriptor("(Ljava/lang/String;[Ljava/lang/Class;)Ljava/lang/reflect/Method;")
                        .unwrap(),
                    false,
                ),
            ),
            SymInstruction::PutStatic(fields.method_field.clone()),
        ];
        assert_eq!(code.len(), 1 + expected_tail.len());
        assert_eq!(
            code[1..].iter().copied().cloned().collect::<Vec<_>>(),
            expected_tail
        );
    }

    #[test]
    fn existing_initializer_runs_afterwards() {
        let (this_class, interface, fields) = setup("()V");
        let prefix = initializer_prefix(&this_class, &interface, &fields, &LoaderSource::DefiningLoader);
        let prefix_len = prefix.len();

        let mut original = MethodCode::new();
        let start = original.fresh_label();
        original.items = vec![
            CodeItem::Label(start),
            CodeItem::LineNumber(7),
            CodeItem::Instruction(SymInstruction::IConst1),
            CodeItem::Instruction(SymInstruction::Pop),
            CodeItem::Branch(BranchInstruction::Return),
        ];

        let patched = prefix_initializer(&original, prefix);
        assert_eq!(patched.items.len(), prefix_len + 5);
        assert_eq!(&patched.items[prefix_len..], &original.items[..]);

        // fresh labels still don't clash with the original ones
        let mut patched = patched;
        assert_ne!(patched.fresh_label(), start);

        let created = new_initializer(vec![]);
        assert_eq!(created.items, vec![CodeItem::Branch(BranchInstruction::Return)]);
    }

    #[test]
    fn class_literals() {
        let (_, no_refs, _) = setup("(IJ)V");
        let (_, refs, _) = setup("(Ljava/lang/String;)V");
        assert!(!uses_class_literals(&no_refs, &LoaderSource::SystemLoader));
        assert!(uses_class_literals(&no_refs, &LoaderSource::DefiningLoader));
        assert!(uses_class_literals(&refs, &LoaderSource::ContextLoader));
    }
}
