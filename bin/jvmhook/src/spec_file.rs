//! Line-oriented hook spec files
//!
//! ```text
//! # comments run to the end of the line
//! class com/intellij/usages/impl/UsageAdapter
//! interface net.example.IHasNavigationOffset getNavigationOffset ()I
//! target getNavigationOffset ()I call-branch com/intellij/usageView/UsageInfo getElement ()Lcom/intellij/psi/PsiElement;
//! args 2
//! ```
//!
//! A `class` line starts a new block, which needs exactly one `interface` line and at least one
//! `target`. An `args` line gives the locals passed as interface arguments for the `target` just
//! above it.

use jvmhook::hook::{CallSite, Error, HookSpec, Target, TriggerShape};
use jvmhook::jvm::code::FieldRef;
use jvmhook::jvm::{parse_descriptor, BinaryName, Name, UnqualifiedName};

/// Interface line, kept as text until the block is complete
struct InterfaceLine {
    name: String,
    method: String,
    descriptor: String,
}

struct Block {
    class: BinaryName,
    interface: Option<InterfaceLine>,
    targets: Vec<Target>,
}

impl Block {
    fn finish(self) -> Result<(BinaryName, HookSpec), Error> {
        let interface = self.interface.ok_or_else(|| {
            Error::InvalidHookSpec(format!("class {:?} has no interface line", self.class))
        })?;
        let spec = HookSpec::new(
            &interface.name,
            &interface.method,
            &interface.descriptor,
            self.targets,
        )?;
        Ok((self.class, spec))
    }
}

/// Parse every class block in a spec file
pub fn parse_spec_file(contents: &str) -> Result<Vec<(BinaryName, HookSpec)>, Error> {
    let mut specs = vec![];
    let mut current: Option<Block> = None;

    for (line_number, line) in contents.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("");
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        let at_line = |err: Error| match err {
            Error::InvalidHookSpec(msg) => {
                Error::InvalidHookSpec(format!("line {}: {}", line_number + 1, msg))
            }
            other => other,
        };
        let parsed = parse_line(&words, &mut current, &mut specs);
        parsed.map_err(at_line)?;
    }

    if let Some(block) = current {
        specs.push(block.finish()?);
    }
    Ok(specs)
}

fn parse_line(
    words: &[&str],
    current: &mut Option<Block>,
    specs: &mut Vec<(BinaryName, HookSpec)>,
) -> Result<(), Error> {
    let (directive, arguments) = (words[0], &words[1..]);

    if directive == "class" {
        let [class] = expect_arguments::<1>(directive, arguments)?;
        if let Some(block) = current.take() {
            specs.push(block.finish()?);
        }
        *current = Some(Block {
            class: name(class)?,
            interface: None,
            targets: vec![],
        });
        return Ok(());
    }

    let block = current
        .as_mut()
        .ok_or_else(|| Error::InvalidHookSpec(format!("'{}' before any 'class'", directive)))?;
    match directive {
        "interface" => {
            let [interface, method, descriptor] = expect_arguments::<3>(directive, arguments)?;
            if block.interface.is_some() {
                return Err(Error::InvalidHookSpec(String::from(
                    "more than one interface for the same class",
                )));
            }
            block.interface = Some(InterfaceLine {
                name: interface.to_owned(),
                method: method.to_owned(),
                descriptor: descriptor.to_owned(),
            });
        }
        "target" => {
            if arguments.len() < 3 {
                return Err(Error::InvalidHookSpec(String::from(
                    "'target' needs a name, a descriptor, and a shape",
                )));
            }
            let shape = parse_shape(arguments[2], &arguments[3..])?;
            block
                .targets
                .push(Target::new(arguments[0], arguments[1], shape)?);
        }
        "args" => {
            let target = block.targets.pop().ok_or_else(|| {
                Error::InvalidHookSpec(String::from("'args' must follow a 'target'"))
            })?;
            let slots = arguments
                .iter()
                .map(|slot| parse_slot(slot))
                .collect::<Result<Vec<u16>, Error>>()?;
            block.targets.push(target.with_arguments(slots));
        }
        other => {
            return Err(Error::InvalidHookSpec(format!(
                "unknown directive '{}'",
                other
            )))
        }
    }
    Ok(())
}

fn parse_shape(shape: &str, arguments: &[&str]) -> Result<TriggerShape, Error> {
    Ok(match shape {
        "entry" => {
            let [slot] = expect_arguments::<1>(shape, arguments)?;
            TriggerShape::Entry {
                slot: parse_slot(slot)?,
            }
        }
        "entry-select" => {
            let [slot, owner, if_true, if_false, descriptor] =
                expect_arguments::<5>(shape, arguments)?;
            let descriptor: jvmhook::jvm::FieldType<BinaryName> = parse_descriptor(descriptor)
                .map_err(|err| Error::InvalidHookSpec(err.to_string()))?;
            let field = |field: &str| -> Result<FieldRef, Error> {
                Ok(FieldRef::new(name(owner)?, name(field)?, descriptor.clone()))
            };
            TriggerShape::EntrySelect {
                slot: parse_slot(slot)?,
                if_true: field(if_true)?,
                if_false: field(if_false)?,
            }
        }
        "call-branch" => {
            let [owner, method, descriptor] = expect_arguments::<3>(shape, arguments)?;
            TriggerShape::CallBranch {
                call: CallSite::new(owner, method, descriptor)?,
            }
        }
        "call-result" => {
            let [owner, method, descriptor] = expect_arguments::<3>(shape, arguments)?;
            TriggerShape::CallResult {
                call: CallSite::new(owner, method, descriptor)?,
            }
        }
        "aggregate" => {
            let [owner, method, descriptor, chunk_owner, chunk_method] =
                expect_arguments::<5>(shape, arguments)?;
            TriggerShape::Aggregate {
                call: CallSite::new(owner, method, descriptor)?,
                chunk_owner: name(chunk_owner)?,
                chunk_method: name(chunk_method)?,
            }
        }
        "cache" => {
            let [owner, method, descriptor, field_owner, field, reference_class] =
                expect_arguments::<6>(shape, arguments)?;
            TriggerShape::Cache {
                call: CallSite::new(owner, method, descriptor)?,
                cache_field: FieldRef::new(
                    name(field_owner)?,
                    name(field)?,
                    TriggerShape::cache_field_type(),
                ),
                reference_class: name(reference_class)?,
            }
        }
        other => {
            return Err(Error::InvalidHookSpec(format!(
                "unknown trigger shape '{}'",
                other
            )))
        }
    })
}

fn expect_arguments<'a, const N: usize>(
    what: &str,
    arguments: &[&'a str],
) -> Result<[&'a str; N], Error> {
    <[&str; N]>::try_from(arguments).map_err(|_| {
        Error::InvalidHookSpec(format!(
            "'{}' takes {} arguments, got {}",
            what,
            N,
            arguments.len()
        ))
    })
}

fn parse_slot(slot: &str) -> Result<u16, Error> {
    slot.parse()
        .map_err(|_| Error::InvalidHookSpec(format!("'{}' is not a local variable slot", slot)))
}

fn name<N: Name>(name: &str) -> Result<N, Error> {
    N::from_string(name.to_owned()).map_err(Error::InvalidHookSpec)
}

#[cfg(test)]
mod test {
    use super::*;
    use jvmhook::jvm::RenderDescriptor;

    const USAGE_ADAPTER: &str = "
        # two classes, one hook each
        class com/intellij/usages/impl/UsageAdapter
        interface net.example.IHasNavigationOffset getNavigationOffset ()I
        target getNavigationOffset ()I call-branch com/intellij/usageView/UsageInfo getElement ()Lcom/intellij/psi/PsiElement;

        class com/intellij/psi/impl/search/JavaReadWriteAccessDetector
        interface net.example.IIsWriteOverride isWrite ()Z
        target getExpressionAccess (Lcom/intellij/psi/PsiElement;)Lcom/intellij/codeInsight/highlighting/ReadWriteAccessDetector$Access; entry-select 1 com/intellij/codeInsight/highlighting/ReadWriteAccessDetector$Access Write Read Lcom/intellij/codeInsight/highlighting/ReadWriteAccessDetector$Access;
    ";

    #[test]
    fn classes_and_targets() {
        let specs = parse_spec_file(USAGE_ADAPTER).unwrap();
        assert_eq!(specs.len(), 2);

        let (class, spec) = &specs[0];
        assert_eq!(class.as_str(), "com/intellij/usages/impl/UsageAdapter");
        assert_eq!(
            spec.interface.interface.as_str(),
            "net/example/IHasNavigationOffset"
        );
        assert_eq!(spec.targets.len(), 1);
        match &spec.targets[0].shape {
            TriggerShape::CallBranch { call } => {
                assert_eq!(call.name.as_str(), "getElement");
                assert_eq!(call.descriptor.render(), "()Lcom/intellij/psi/PsiElement;");
            }
            other => panic!("unexpected shape {:?}", other),
        }

        let (_, spec) = &specs[1];
        match &spec.targets[0].shape {
            TriggerShape::EntrySelect {
                slot,
                if_true,
                if_false,
            } => {
                assert_eq!(*slot, 1);
                assert_eq!(if_true.name.as_str(), "Write");
                assert_eq!(if_false.name.as_str(), "Read");
                assert_eq!(if_true.descriptor, if_false.descriptor);
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn arguments_attach_to_the_previous_target() {
        let specs = parse_spec_file(
            "class app/Widget
             interface app.IHook hook (JLjava/lang/String;)Ljava/lang/Object;
             target compute (JLjava/lang/String;)Ljava/lang/Object; entry 0 # receiver
             args 1 3",
        )
        .unwrap();
        assert_eq!(specs[0].1.targets[0].argument_slots, vec![1, 3]);
    }

    #[test]
    fn cache_and_aggregate_shapes() {
        let specs = parse_spec_file(
            "class com/intellij/usages/UsageInfo2UsageAdapter
             interface net.example.ITextChunks getTextChunks ()[Lcom/intellij/usages/TextChunk;
             target getPlainText ()Ljava/lang/String; aggregate com/intellij/usages/UsageInfo2UsageAdapter getUsageInfo ()Lcom/intellij/usageView/UsageInfo; com/intellij/usages/TextChunk getText
             target initChunks ()[Lcom/intellij/usages/TextChunk; cache com/intellij/usages/UsageInfo2UsageAdapter getUsageInfo ()Lcom/intellij/usageView/UsageInfo; com/intellij/usages/UsageInfo2UsageAdapter myTextChunks com/intellij/reference/SoftReference",
        )
        .unwrap();
        let targets = &specs[0].1.targets;
        assert!(matches!(
            &targets[0].shape,
            TriggerShape::Aggregate { chunk_method, .. } if chunk_method.as_str() == "getText"
        ));
        match &targets[1].shape {
            TriggerShape::Cache {
                cache_field,
                reference_class,
                ..
            } => {
                assert_eq!(cache_field.descriptor.render(), "Ljava/lang/ref/Reference;");
                assert_eq!(reference_class.as_str(), "com/intellij/reference/SoftReference");
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn errors_carry_line_numbers() {
        let error = |contents: &str| match parse_spec_file(contents) {
            Err(Error::InvalidHookSpec(msg)) => msg,
            other => panic!("expected an error, got {:?}", other.map(|specs| specs.len())),
        };

        assert!(error("interface app.IHook hook ()V").starts_with("line 1:"));
        assert!(error("class app/A\n\ntarget run ()V sideways").starts_with("line 3:"));
        assert!(error("class app/A\nargs 1").contains("'args' must follow a 'target'"));
        assert!(error("class app/A\ntarget run ()V entry x").contains("not a local variable slot"));
        assert!(error("class app/A\ntarget run ()V entry 0").contains("no interface line"));
        assert!(error("class app/A\ninterface app.I run ()V\nfrobnicate").contains("unknown directive"));
    }
}
