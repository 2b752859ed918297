use super::Error;
use crate::jvm::code::{FieldRef, MethodRef};
use crate::jvm::verifier::{is_reference_assignable, TypeHierarchy};
use crate::jvm::{
    parse_descriptor, BaseType, BinaryName, FieldType, MethodDescriptor, Name, ParseDescriptor,
    RefType, RenderDescriptor, UnqualifiedName,
};
use std::collections::HashSet;

/// The one method of the external interface that hooks dispatch to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceMethod {
    /// Interface, resolved by name at class initialization time
    pub interface: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
}

/// Call instruction that a trigger waits for
///
/// Matching ignores the invocation kind and whether the owner is an interface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSite {
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
}

impl CallSite {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Result<CallSite, Error> {
        Ok(CallSite {
            owner: make_name(owner)?,
            name: make_name(name)?,
            descriptor: make_descriptor(descriptor)?,
        })
    }

    pub fn matches(&self, method: &MethodRef) -> bool {
        matches!(&method.class, RefType::Object(owner) if owner == &self.owner)
            && method.name == self.name
            && method.descriptor == self.descriptor
    }
}

/// Where in the hooked method the hook gets spliced, and what happens to its result
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerShape {
    /// At the very start of the method, hooking the object in local `slot`
    ///
    /// When the object implements the interface, the interface result is returned.
    Entry { slot: u16 },

    /// Like [`TriggerShape::Entry`], but the boolean interface result picks which of two static
    /// fields gets returned
    EntrySelect {
        slot: u16,
        if_true: FieldRef,
        if_false: FieldRef,
    },

    /// After `call`, the first local variable instruction names the slot holding the call result
    /// and the next jump names a label. The hook is spliced in at that label and returns the
    /// interface result.
    CallBranch { call: CallSite },

    /// The value `call` returns is stored into a local. Right after that store, the hook replaces
    /// the value in the local with the interface result and execution continues.
    CallResult { call: CallSite },

    /// Like [`TriggerShape::CallResult`], but the interface returns an array of chunks whose
    /// `chunk_method()` strings get concatenated and returned
    Aggregate {
        call: CallSite,
        chunk_owner: BinaryName,
        chunk_method: UnqualifiedName,
    },

    /// Like [`TriggerShape::CallResult`], but the interface result is wrapped in a new
    /// `reference_class` instance, stored into `cache_field` on `this`, and returned
    Cache {
        call: CallSite,
        cache_field: FieldRef,
        reference_class: BinaryName,
    },
}

impl TriggerShape {
    /// Call instruction this shape waits for, if any
    pub fn call(&self) -> Option<&CallSite> {
        match self {
            TriggerShape::Entry { .. } | TriggerShape::EntrySelect { .. } => None,
            TriggerShape::CallBranch { call }
            | TriggerShape::CallResult { call }
            | TriggerShape::Aggregate { call, .. }
            | TriggerShape::Cache { call, .. } => Some(call),
        }
    }

    /// Descriptor of the field used by [`TriggerShape::Cache`]
    pub fn cache_field_type() -> FieldType<BinaryName> {
        FieldType::object(BinaryName::REFERENCE)
    }
}

/// Method of the rewritten class that gets a hook
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub shape: TriggerShape,

    /// Locals holding the interface method arguments, in parameter order
    pub argument_slots: Vec<u16>,
}

impl Target {
    pub fn new(name: &str, descriptor: &str, shape: TriggerShape) -> Result<Target, Error> {
        Ok(Target {
            name: make_name(name)?,
            descriptor: make_descriptor(descriptor)?,
            shape,
            argument_slots: vec![],
        })
    }

    pub fn with_arguments(mut self, argument_slots: Vec<u16>) -> Target {
        self.argument_slots = argument_slots;
        self
    }

    fn validate(&self, interface: &InterfaceMethod) -> Result<(), Error> {
        let invalid = |msg: String| Err(Error::InvalidHookSpec(format!("{}: {}", self, msg)));

        let parameters = &interface.descriptor.parameters;
        if self.argument_slots.len() != parameters.len() {
            return invalid(format!(
                "{} argument slots given for {} interface parameters",
                self.argument_slots.len(),
                parameters.len()
            ));
        }

        let interface_return = &interface.descriptor.return_type;
        let target_return = &self.descriptor.return_type;
        match &self.shape {
            TriggerShape::Entry { .. } | TriggerShape::CallBranch { .. } => {
                if ReturnKind::of(interface_return) != ReturnKind::of(target_return) {
                    return invalid(format!(
                        "interface returns {} which cannot be returned from the target",
                        render_return(interface_return)
                    ));
                }
            }
            TriggerShape::EntrySelect {
                if_true, if_false, ..
            } => {
                if interface_return != &Some(FieldType::boolean()) {
                    return invalid(String::from("interface must return a boolean"));
                }
                if if_true.descriptor != if_false.descriptor
                    || ReturnKind::of(&Some(if_true.descriptor.clone())) != ReturnKind::Reference
                    || ReturnKind::of(target_return) != ReturnKind::Reference
                {
                    return invalid(String::from(
                        "selected fields and the target must have a reference type",
                    ));
                }
            }
            TriggerShape::CallResult { call } => {
                if ReturnKind::of(interface_return) != ReturnKind::Reference
                    || ReturnKind::of(&call.descriptor.return_type) != ReturnKind::Reference
                {
                    return invalid(String::from(
                        "interface and the triggering call must return references",
                    ));
                }
            }
            TriggerShape::Cache { .. } => {
                if ReturnKind::of(interface_return) != ReturnKind::Reference
                    || ReturnKind::of(target_return) != ReturnKind::Reference
                {
                    return invalid(String::from(
                        "interface and the target must return references",
                    ));
                }
            }
            TriggerShape::Aggregate { .. } => {
                let returns_array = matches!(
                    interface_return,
                    Some(FieldType::Ref(RefType::ObjectArray(_)))
                );
                if !returns_array || ReturnKind::of(target_return) != ReturnKind::Reference {
                    return invalid(String::from(
                        "interface must return an object array and the target a reference",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Target {
    /// Check that every reference the hook produces fits where the method goes on to use it
    ///
    /// This needs the class hierarchy, so unlike the checks in [`HookSpec::new`] it only runs
    /// once the class being rewritten is known.
    pub fn check_types(
        &self,
        interface: &InterfaceMethod,
        hierarchy: &dyn TypeHierarchy,
    ) -> Result<(), Error> {
        let interface_return = &interface.descriptor.return_type;
        let target_return = &self.descriptor.return_type;
        let string = Some(FieldType::object(BinaryName::STRING));

        let (produced, expected, what) = match &self.shape {
            TriggerShape::Entry { .. } | TriggerShape::CallBranch { .. } => {
                (interface_return, target_return, "the target's return type")
            }
            TriggerShape::EntrySelect { if_true, .. } => {
                let selected = Some(if_true.descriptor.clone());
                return self.check_fits(hierarchy, &selected, target_return, "the return type");
            }
            TriggerShape::CallResult { call } => (
                interface_return,
                &call.descriptor.return_type,
                "the triggering call's return type",
            ),
            TriggerShape::Aggregate { chunk_owner, .. } => {
                let chunk = match interface_return {
                    Some(FieldType::Ref(array)) => array.element_type(),
                    _ => None,
                };
                let owner = Some(FieldType::object(chunk_owner.clone()));
                self.check_fits(hierarchy, &chunk, &owner, "the chunk class")?;
                return self.check_fits(hierarchy, &string, target_return, "the return type");
            }
            TriggerShape::Cache {
                cache_field,
                reference_class,
                ..
            } => {
                let reference = Some(FieldType::object(reference_class.clone()));
                let field = Some(cache_field.descriptor.clone());
                self.check_fits(hierarchy, &reference, &field, "the cache field")?;
                (interface_return, target_return, "the target's return type")
            }
        };
        self.check_fits(hierarchy, produced, expected, what)
    }

    fn check_fits(
        &self,
        hierarchy: &dyn TypeHierarchy,
        produced: &Option<FieldType<BinaryName>>,
        expected: &Option<FieldType<BinaryName>>,
        what: &str,
    ) -> Result<(), Error> {
        if let (Some(FieldType::Ref(from)), Some(FieldType::Ref(to))) = (produced, expected) {
            if !is_reference_assignable(hierarchy, from, to)? {
                return Err(Error::InvalidHookSpec(format!(
                    "{}: {} does not fit {} {}",
                    self,
                    from.render(),
                    what,
                    to.render()
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor.render())
    }
}

/// Everything needed to hook one class
///
/// Created once before a class gets visited and never changed afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookSpec {
    pub interface: InterfaceMethod,
    pub targets: Vec<Target>,
}

impl HookSpec {
    /// Build a spec for an interface given by its dotted name (`net.example.IFoo`)
    pub fn new(
        interface: &str,
        method: &str,
        descriptor: &str,
        targets: Vec<Target>,
    ) -> Result<HookSpec, Error> {
        let interface = InterfaceMethod {
            interface: BinaryName::from_dotted(interface).map_err(Error::InvalidHookSpec)?,
            name: make_name(method)?,
            descriptor: make_descriptor(descriptor)?,
        };

        for parameter in &interface.descriptor.parameters {
            if let FieldType::Ref(RefType::PrimitiveArray(_)) = parameter {
                return Err(Error::InvalidHookSpec(format!(
                    "{} takes a primitive array, which cannot be marshaled",
                    interface.descriptor.render()
                )));
            }
        }

        if targets.is_empty() {
            return Err(Error::InvalidHookSpec(String::from("no target methods")));
        }
        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert((&target.name, &target.descriptor)) {
                return Err(Error::InvalidHookSpec(format!(
                    "{} is targeted more than once",
                    target
                )));
            }
            target.validate(&interface)?;
        }

        Ok(HookSpec { interface, targets })
    }

    /// Find the target for a method of the rewritten class
    pub fn target(
        &self,
        name: &str,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Option<&Target> {
        self.targets
            .iter()
            .find(|target| target.name.as_str() == name && &target.descriptor == descriptor)
    }
}

/// How a value of some type gets returned from a method
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReturnKind {
    Void,
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ReturnKind {
    pub fn of(return_type: &Option<FieldType<BinaryName>>) -> ReturnKind {
        match return_type {
            None => ReturnKind::Void,
            Some(FieldType::Ref(_)) => ReturnKind::Reference,
            Some(FieldType::Base(BaseType::Long)) => ReturnKind::Long,
            Some(FieldType::Base(BaseType::Float)) => ReturnKind::Float,
            Some(FieldType::Base(BaseType::Double)) => ReturnKind::Double,
            Some(FieldType::Base(_)) => ReturnKind::Int,
        }
    }
}

fn render_return(return_type: &Option<FieldType<BinaryName>>) -> String {
    match return_type {
        None => String::from("V"),
        Some(typ) => typ.render(),
    }
}

pub(crate) fn make_name<N: Name>(name: &str) -> Result<N, Error> {
    N::from_string(name.to_owned()).map_err(Error::InvalidHookSpec)
}

pub(crate) fn make_descriptor<D: ParseDescriptor>(descriptor: &str) -> Result<D, Error> {
    parse_descriptor(descriptor).map_err(|err| Error::InvalidHookSpec(err.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::{
        ClassGraph, ClassGraphArenas, ClassHeader, ClassPath, InMemoryClassLoader, JdkClassLoader,
    };

    fn call() -> CallSite {
        CallSite::new(
            "com/intellij/usageView/UsageInfo",
            "getElement",
            "()Lcom/intellij/psi/PsiElement;",
        )
        .unwrap()
    }

    #[test]
    fn call_sites_match_owner_name_and_descriptor() {
        let site = call();
        let mut method = MethodRef::new(
            BinaryName::from_string(String::from("com/intellij/usageView/UsageInfo")).unwrap(),
            UnqualifiedName::from_string(String::from("getElement")).unwrap(),
            parse_descriptor("()Lcom/intellij/psi/PsiElement;").unwrap(),
            false,
        );
        assert!(site.matches(&method));

        method.is_interface = true;
        assert!(site.matches(&method));

        method.descriptor = parse_descriptor("()Ljava/lang/Object;").unwrap();
        assert!(!site.matches(&method));
    }

    #[test]
    fn specs_are_validated() {
        let entry = || Target::new("isWrite", "()Z", TriggerShape::Entry { slot: 0 }).unwrap();

        let spec = HookSpec::new("net.example.IHook", "isWrite", "()Z", vec![entry()]).unwrap();
        assert_eq!(spec.interface.interface.as_str(), "net/example/IHook");
        assert!(spec
            .target("isWrite", &parse_descriptor("()Z").unwrap())
            .is_some());
        assert!(spec
            .target("isWrite", &parse_descriptor("()I").unwrap())
            .is_none());

        // duplicated target
        assert!(matches!(
            HookSpec::new("net.example.IHook", "isWrite", "()Z", vec![entry(), entry()]),
            Err(Error::InvalidHookSpec(_))
        ));

        // argument slots must line up with the interface parameters
        assert!(matches!(
            HookSpec::new("net.example.IHook", "isWrite", "(J)Z", vec![entry()]),
            Err(Error::InvalidHookSpec(_))
        ));
        assert!(HookSpec::new(
            "net.example.IHook",
            "isWrite",
            "(J)Z",
            vec![entry().with_arguments(vec![1])]
        )
        .is_ok());

        // primitive arrays can't be marshaled
        assert!(matches!(
            HookSpec::new(
                "net.example.IHook",
                "isWrite",
                "([I)Z",
                vec![entry().with_arguments(vec![1])]
            ),
            Err(Error::InvalidHookSpec(_))
        ));

        // `()J` can't be returned from a `()Z` method
        assert!(matches!(
            HookSpec::new("net.example.IHook", "isWrite", "()J", vec![entry()]),
            Err(Error::InvalidHookSpec(_))
        ));
    }

    #[test]
    fn shapes_constrain_the_interface_result() {
        let aggregate = Target::new(
            "getPlainText",
            "()Ljava/lang/String;",
            TriggerShape::Aggregate {
                call: call(),
                chunk_owner: make_name("com/intellij/usages/TextChunk").unwrap(),
                chunk_method: make_name("getText").unwrap(),
            },
        )
        .unwrap();
        assert!(HookSpec::new(
            "net.example.IHasCustomDescription",
            "getCustomText",
            "()[Lcom/intellij/usages/TextChunk;",
            vec![aggregate.clone()]
        )
        .is_ok());
        assert!(matches!(
            HookSpec::new(
                "net.example.IHasCustomDescription",
                "getCustomText",
                "()Ljava/lang/String;",
                vec![aggregate]
            ),
            Err(Error::InvalidHookSpec(_))
        ));

        let access: BinaryName = make_name("app/Access").unwrap();
        let select = |name: &str| {
            FieldRef::new(
                access.clone(),
                make_name(name).unwrap(),
                FieldType::object(access.clone()),
            )
        };
        let entry_select = Target::new(
            "getExpressionAccess",
            "(Ljava/lang/Object;)Lapp/Access;",
            TriggerShape::EntrySelect {
                slot: 1,
                if_true: select("Write"),
                if_false: select("Read"),
            },
        )
        .unwrap();
        assert!(HookSpec::new("app.IWrite", "isWrite", "()Z", vec![entry_select.clone()]).is_ok());
        assert!(matches!(
            HookSpec::new("app.IWrite", "isWrite", "()I", vec![entry_select]),
            Err(Error::InvalidHookSpec(_))
        ));
    }

    fn spec(descriptor: &str, target: Target) -> HookSpec {
        HookSpec::new("app.IHook", "hook", descriptor, vec![target]).unwrap()
    }

    fn is_ill_typed(spec: &HookSpec, hierarchy: &dyn TypeHierarchy) -> bool {
        match spec.targets[0].check_types(&spec.interface, hierarchy) {
            Ok(()) => false,
            Err(Error::InvalidHookSpec(_)) => true,
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn hook_results_must_fit_where_they_are_used() {
        let arenas = ClassGraphArenas::new();
        let mut app_classes = InMemoryClassLoader::new();
        app_classes.add_header(ClassHeader {
            name: make_name("app/Elem").unwrap(),
            superclass: Some(BinaryName::OBJECT),
            interfaces: vec![],
            is_interface: false,
        });
        let graph = ClassGraph::new(
            &arenas,
            Box::new(ClassPath::new(vec![
                Box::new(app_classes),
                Box::new(JdkClassLoader::new()),
            ])),
        );

        // entry and call-branch results get returned as is
        let name_entry =
            || Target::new("name", "()Ljava/lang/String;", TriggerShape::Entry { slot: 0 }).unwrap();
        assert!(is_ill_typed(&spec("()Ljava/lang/Object;", name_entry()), &graph));
        assert!(!is_ill_typed(&spec("()Ljava/lang/String;", name_entry()), &graph));
        let branch = Target::new(
            "size",
            "()Ljava/lang/Number;",
            TriggerShape::CallBranch { call: call() },
        )
        .unwrap();
        assert!(!is_ill_typed(&spec("()Ljava/lang/Integer;", branch.clone()), &graph));
        assert!(is_ill_typed(&spec("()Ljava/lang/String;", branch), &graph));

        // call-result overwrites a local that the rest of the body still reads
        let show = || {
            Target::new(
                "show",
                "()V",
                TriggerShape::CallResult {
                    call: CallSite::new("app/Holder", "get", "()Lapp/Elem;").unwrap(),
                },
            )
            .unwrap()
        };
        assert!(is_ill_typed(&spec("()Ljava/lang/String;", show()), &graph));
        assert!(!is_ill_typed(&spec("()Lapp/Elem;", show()), &graph));

        // entry-select returns one of the two fields
        let access: BinaryName = make_name("app/Elem").unwrap();
        let select = |name: &str| {
            FieldRef::new(
                access.clone(),
                make_name(name).unwrap(),
                FieldType::object(access.clone()),
            )
        };
        let entry_select = |descriptor: &str| {
            Target::new(
                "access",
                descriptor,
                TriggerShape::EntrySelect {
                    slot: 1,
                    if_true: select("Write"),
                    if_false: select("Read"),
                },
            )
            .unwrap()
        };
        assert!(!is_ill_typed(&spec("()Z", entry_select("()Ljava/lang/Object;")), &graph));
        assert!(is_ill_typed(&spec("()Z", entry_select("()Ljava/lang/String;")), &graph));

        // aggregate calls the chunk method on each element and returns a string
        let aggregate = |descriptor: &str, chunk_owner: &str| {
            Target::new(
                "text",
                descriptor,
                TriggerShape::Aggregate {
                    call: call(),
                    chunk_owner: make_name(chunk_owner).unwrap(),
                    chunk_method: make_name("getText").unwrap(),
                },
            )
            .unwrap()
        };
        let chunks = "()[Lapp/Elem;";
        assert!(!is_ill_typed(&spec(chunks, aggregate("()Ljava/lang/CharSequence;", "app/Elem")), &graph));
        assert!(is_ill_typed(&spec(chunks, aggregate("()Ljava/lang/String;", "java/lang/String")), &graph));
        assert!(is_ill_typed(&spec(chunks, aggregate("()Ljava/lang/Integer;", "app/Elem")), &graph));

        // cache returns the interface result and stores the reference wrapper
        let cache = |reference_class: &str| {
            Target::new(
                "chunks",
                "()[Lapp/Elem;",
                TriggerShape::Cache {
                    call: call(),
                    cache_field: FieldRef::new(
                        make_name("app/Holder").unwrap(),
                        make_name("cached").unwrap(),
                        TriggerShape::cache_field_type(),
                    ),
                    reference_class: make_name(reference_class).unwrap(),
                },
            )
            .unwrap()
        };
        assert!(!is_ill_typed(&spec(chunks, cache("java/lang/ref/SoftReference")), &graph));
        assert!(is_ill_typed(&spec("()[Ljava/lang/Object;", cache("java/lang/ref/SoftReference")), &graph));
        assert!(is_ill_typed(&spec(chunks, cache("java/lang/String")), &graph));
    }

    #[test]
    fn call_results_must_be_references() {
        let target = Target::new(
            "show",
            "()V",
            TriggerShape::CallResult {
                call: CallSite::new("app/Holder", "count", "()I").unwrap(),
            },
        )
        .unwrap();
        assert!(matches!(
            HookSpec::new("app.IHook", "hook", "()Ljava/lang/Integer;", vec![target]),
            Err(Error::InvalidHookSpec(_))
        ));
    }

    #[test]
    fn return_kinds() {
        let kind = |descriptor: &str| {
            let descriptor: MethodDescriptor<BinaryName> = parse_descriptor(descriptor).unwrap();
            ReturnKind::of(&descriptor.return_type)
        };
        assert_eq!(kind("()V"), ReturnKind::Void);
        assert_eq!(kind("()Z"), ReturnKind::Int);
        assert_eq!(kind("()C"), ReturnKind::Int);
        assert_eq!(kind("()J"), ReturnKind::Long);
        assert_eq!(kind("()D"), ReturnKind::Double);
        assert_eq!(kind("()[I"), ReturnKind::Reference);
    }
}
