//! Trigger matching inside a method body
//!
//! Each hooked method is streamed through a small state machine. Every item of the original body
//! goes in as a [`PatchEvent`], and [`transition`] hands back the items to emit in its place:
//! usually just the item itself, but at the trigger point the item followed by the hook. A body
//! in which the trigger never shows up comes out unchanged, which [`patch_method`] reports by
//! returning `None`.

use super::emitter::HookEmitter;
use super::marshal::ValueMarshal;
use super::spec::{ReturnKind, Target, TriggerShape};
use crate::jvm::code::{
    BranchInstruction, CodeItem, InvokeType, LabelGenerator, MethodCode, MethodRef,
    OrdComparison, SymInstruction, SynLabel, SynLabelGenerator,
};
use crate::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName};

/// What is known about the hook being spliced into one method
pub struct PatchContext<'a> {
    pub emitter: &'a HookEmitter,
    pub target: &'a Target,
}

/// Progress through the trigger pattern
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Method body hasn't started
    Start,

    /// Looking for the trigger call
    WaitingForCall,

    /// Trigger call seen, looking for the local variable its result goes into
    WaitingForLocal,

    /// Looking for the jump after the local variable instruction
    WaitingForJump { slot: u16 },

    /// Looking for the label the jump goes to
    WaitingForLabel { slot: u16, label: SynLabel },

    /// Hook has been spliced in
    Done,

    /// Trigger matched somewhere the hook can't go
    Abandoned,
}

#[derive(Clone, Debug)]
pub struct PatchState {
    pub phase: Phase,

    /// Source of labels for the hook (must not clash with labels in the method)
    pub labels: SynLabelGenerator,
}

impl PatchState {
    pub fn new(labels: SynLabelGenerator) -> PatchState {
        PatchState {
            phase: Phase::Start,
            labels,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub enum PatchEvent<'a> {
    /// Sent once, before any items
    MethodStart,
    Item(&'a CodeItem),
}

/// Advance the state machine by one event
pub fn transition(
    context: &PatchContext<'_>,
    state: PatchState,
    event: PatchEvent<'_>,
) -> (PatchState, Vec<CodeItem>) {
    let PatchState { phase, mut labels } = state;
    let shape = &context.target.shape;

    let item = match event {
        PatchEvent::MethodStart => {
            return match (phase, shape) {
                (Phase::Start, TriggerShape::Entry { slot })
                | (Phase::Start, TriggerShape::EntrySelect { slot, .. }) => {
                    let hook = hook_site(context, &mut labels, *slot);
                    (next(Phase::Done, labels), hook)
                }
                (Phase::Start, _) => (next(Phase::WaitingForCall, labels), vec![]),
                (phase, _) => (next(phase, labels), vec![]),
            };
        }
        PatchEvent::Item(item) => item,
    };
    let mut emitted = vec![item.clone()];

    let phase = match (phase, item) {
        (Phase::WaitingForCall, CodeItem::Instruction(SymInstruction::Invoke(_, method)))
            if shape.call().map_or(false, |call| call.matches(method)) =>
        {
            log::trace!("Trigger call {:?} matched in {}", method, context.target);
            Phase::WaitingForLocal
        }

        (Phase::WaitingForLocal, CodeItem::Instruction(insn)) => match local_slot(insn) {
            None => Phase::WaitingForLocal,
            Some(slot) => match shape {
                TriggerShape::CallBranch { .. } => Phase::WaitingForJump { slot },
                _ if !has_scratch_locals(shape, slot) => Phase::Abandoned,
                _ => {
                    emitted.extend(hook_site(context, &mut labels, slot));
                    Phase::Done
                }
            },
        },

        (Phase::WaitingForJump { slot }, CodeItem::Branch(branch)) => match jump_target(branch) {
            Some(label) => Phase::WaitingForLabel { slot, label },
            None => Phase::WaitingForJump { slot },
        },

        (Phase::WaitingForLabel { slot, label }, CodeItem::Label(seen)) if *seen == label => {
            emitted.extend(hook_site(context, &mut labels, slot));
            Phase::Done
        }

        (phase, _) => phase,
    };

    (next(phase, labels), emitted)
}

fn next(phase: Phase, labels: SynLabelGenerator) -> PatchState {
    PatchState { phase, labels }
}

/// Run a method body through the state machine
///
/// Returns `None` if the trigger was never found.
pub fn patch_method(context: &PatchContext<'_>, code: &MethodCode) -> Option<MethodCode> {
    let (mut state, mut items) = transition(
        context,
        PatchState::new(code.labels.clone()),
        PatchEvent::MethodStart,
    );
    for item in &code.items {
        let (new_state, emitted) = transition(context, state, PatchEvent::Item(item));
        state = new_state;
        items.extend(emitted);
    }

    match state.phase {
        Phase::Done => Some(MethodCode {
            items,
            exception_handlers: code.exception_handlers.clone(),
            local_variables: code.local_variables.clone(),
            labels: state.labels,
        }),
        phase => {
            log::debug!("Trigger for {} not found (stopped at {:?})", context.target, phase);
            None
        }
    }
}

/// Local variable read or written (`iinc` doesn't count)
fn local_slot(insn: &SymInstruction) -> Option<u16> {
    match insn {
        SymInstruction::IInc(_, _) => None,
        other => other.local_variable(),
    }
}

/// Target of a jump (switches don't count)
fn jump_target(branch: &BranchInstruction<SynLabel>) -> Option<SynLabel> {
    match branch {
        BranchInstruction::If(_, label)
        | BranchInstruction::IfICmp(_, label)
        | BranchInstruction::IfACmp(_, label)
        | BranchInstruction::IfNull(_, label)
        | BranchInstruction::Goto(label) => Some(*label),
        _ => None,
    }
}

/// The aggregate loop uses the three locals after the result
fn has_scratch_locals(shape: &TriggerShape, slot: u16) -> bool {
    match shape {
        TriggerShape::Aggregate { .. } => slot.checked_add(3).is_some(),
        _ => true,
    }
}

/// Test the object in `slot`, call the interface on it, and deal with the result
fn hook_site(
    context: &PatchContext<'_>,
    labels: &mut SynLabelGenerator,
    slot: u16,
) -> Vec<CodeItem> {
    let emitter = context.emitter;
    let skip = labels.fresh_label();

    let mut code = vec![CodeItem::Instruction(SymInstruction::ALoad(slot))];
    code.extend(emitter.prologue(skip));
    code.push(CodeItem::Instruction(SymInstruction::ALoad(slot)));
    for (argument, argument_slot) in emitter
        .marshaling
        .arguments
        .iter()
        .zip(&context.target.argument_slots)
    {
        code.push(CodeItem::Instruction(load(argument, *argument_slot)));
    }
    code.extend(emitter.interface_call());
    code.extend(use_result(context, labels, slot));
    code.extend(emitter.epilogue(skip));

    log::debug!("Spliced hook into {} at local {}", context.target, slot);
    code
}

/// What happens to the interface result once it is on the stack
fn use_result(
    context: &PatchContext<'_>,
    labels: &mut SynLabelGenerator,
    slot: u16,
) -> Vec<CodeItem> {
    use CodeItem::{Branch, Instruction, Label};
    use crate::jvm::code::Instruction::*;

    match &context.target.shape {
        TriggerShape::Entry { .. } | TriggerShape::CallBranch { .. } => {
            vec![Branch(return_instruction(ReturnKind::of(
                &context.target.descriptor.return_type,
            )))]
        }

        TriggerShape::EntrySelect {
            if_true, if_false, ..
        } => {
            let false_label = labels.fresh_label();
            let return_label = labels.fresh_label();
            vec![
                Branch(BranchInstruction::If(OrdComparison::EQ, false_label)),
                Instruction(GetStatic(if_true.clone())),
                Branch(BranchInstruction::Goto(return_label)),
                Label(false_label),
                Instruction(GetStatic(if_false.clone())),
                Label(return_label),
                Branch(BranchInstruction::AReturn),
            ]
        }

        TriggerShape::CallResult { .. } => vec![Instruction(AStore(slot))],

        TriggerShape::Aggregate {
            chunk_owner,
            chunk_method,
            ..
        } => {
            let length = slot + 1;
            let builder = slot + 2;
            let index = slot + 3;
            let body = labels.fresh_label();
            let condition = labels.fresh_label();
            let string = || FieldType::object(BinaryName::STRING);
            vec![
                Instruction(AStore(slot)),
                Instruction(ALoad(slot)),
                Instruction(ArrayLength),
                Instruction(IStore(length)),
                Instruction(New(RefType::Object(BinaryName::STRINGBUILDER))),
                Instruction(Dup),
                Instruction(Invoke(
                    InvokeType::Special,
                    method(BinaryName::STRINGBUILDER, UnqualifiedName::INIT, vec![], None),
                )),
                Instruction(AStore(builder)),
                Instruction(IConst0),
                Instruction(IStore(index)),
                Branch(BranchInstruction::Goto(condition)),
                Label(body),
                Instruction(ALoad(builder)),
                Instruction(ALoad(slot)),
                Instruction(ILoad(index)),
                Instruction(AALoad),
                Instruction(Invoke(
                    InvokeType::Virtual,
                    method(chunk_owner.clone(), chunk_method.clone(), vec![], Some(string())),
                )),
                Instruction(Invoke(
                    InvokeType::Virtual,
                    method(
                        BinaryName::STRINGBUILDER,
                        UnqualifiedName::APPEND,
                        vec![string()],
                        Some(FieldType::object(BinaryName::STRINGBUILDER)),
                    ),
                )),
                Instruction(Pop),
                Instruction(IInc(index, 1)),
                Label(condition),
                Instruction(ILoad(index)),
                Instruction(ILoad(length)),
                Branch(BranchInstruction::IfICmp(OrdComparison::LT, body)),
                Instruction(ALoad(builder)),
                Instruction(Invoke(
                    InvokeType::Virtual,
                    method(
                        BinaryName::STRINGBUILDER,
                        UnqualifiedName::TOSTRING,
                        vec![],
                        Some(string()),
                    ),
                )),
                Branch(BranchInstruction::AReturn),
            ]
        }

        TriggerShape::Cache {
            cache_field,
            reference_class,
            ..
        } => vec![
            Instruction(AStore(slot)),
            Instruction(ALoad(0)),
            Instruction(New(RefType::Object(reference_class.clone()))),
            Instruction(Dup),
            Instruction(ALoad(slot)),
            Instruction(Invoke(
                InvokeType::Special,
                method(
                    reference_class.clone(),
                    UnqualifiedName::INIT,
                    vec![FieldType::object(BinaryName::OBJECT)],
                    None,
                ),
            )),
            Instruction(PutField(cache_field.clone())),
            Instruction(ALoad(slot)),
            Branch(BranchInstruction::AReturn),
        ],
    }
}

fn load(argument: &ValueMarshal, slot: u16) -> SymInstruction {
    match argument {
        ValueMarshal::Reference(_) => SymInstruction::ALoad(slot),
        ValueMarshal::Primitive { base, .. } => match base {
            BaseType::Long => SymInstruction::LLoad(slot),
            BaseType::Float => SymInstruction::FLoad(slot),
            BaseType::Double => SymInstruction::DLoad(slot),
            _ => SymInstruction::ILoad(slot),
        },
    }
}

pub fn return_instruction(kind: ReturnKind) -> BranchInstruction<SynLabel> {
    match kind {
        ReturnKind::Void => BranchInstruction::Return,
        ReturnKind::Int => BranchInstruction::IReturn,
        ReturnKind::Long => BranchInstruction::LReturn,
        ReturnKind::Float => BranchInstruction::FReturn,
        ReturnKind::Double => BranchInstruction::DReturn,
        ReturnKind::Reference => BranchInstruction::AReturn,
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::hook::fields::HookFields;
    use crate::hook::spec::{CallSite, HookSpec};
    use crate::jvm::code::{EqComparison, FieldRef};
    use crate::jvm::Name;

    const GET_ELEMENT: (&str, &str, &str) = (
        "com/intellij/usageView/UsageInfo",
        "getElement",
        "()Lcom/intellij/psi/PsiElement;",
    );

    fn call_site() -> CallSite {
        CallSite::new(GET_ELEMENT.0, GET_ELEMENT.1, GET_ELEMENT.2).unwrap()
    }

    fn trigger_call() -> CodeItem {
        let site = call_site();
        CodeItem::Instruction(SymInstruction::Invoke(
            InvokeType::Virtual,
            MethodRef::new(site.owner, site.name, site.descriptor, false),
        ))
    }

    fn spec(interface_descriptor: &str, target: Target) -> (HookEmitter, Target) {
        let spec = HookSpec::new("app.IHook", "hook", interface_descriptor, vec![target]).unwrap();
        let this_class = BinaryName::from_string(String::from("app/Target")).unwrap();
        let fields = HookFields::new(&this_class, &spec.interface).unwrap();
        let emitter = HookEmitter::new(fields, &spec.interface);
        (emitter, spec.targets[0].clone())
    }

    fn run(emitter: &HookEmitter, target: &Target, code: &MethodCode) -> Option<MethodCode> {
        let context = PatchContext { emitter, target };
        patch_method(&context, code)
    }

    fn body(items: impl FnOnce(&mut MethodCode) -> Vec<CodeItem>) -> MethodCode {
        let mut code = MethodCode::new();
        code.items = items(&mut code);
        code
    }

    fn position(items: &[CodeItem], item: &CodeItem) -> usize {
        items
            .iter()
            .position(|i| i == item)
            .unwrap_or_else(|| panic!("{:?} missing", item))
    }

    #[test]
    fn entry_hook_goes_first() {
        let target = Target::new("isWrite", "()Z", TriggerShape::Entry { slot: 0 }).unwrap();
        let (emitter, target) = spec("()Z", target);
        let original = body(|_| {
            vec![
                CodeItem::LineNumber(3),
                CodeItem::Instruction(SymInstruction::IConst0),
                CodeItem::Branch(BranchInstruction::IReturn),
            ]
        });

        let patched = run(&emitter, &target, &original).unwrap();
        let items = &patched.items;
        assert_eq!(items[0], CodeItem::Instruction(SymInstruction::ALoad(0)));

        // hook returns, then the skip label leads into the untouched original body
        let hook_len = items.len() - original.items.len();
        assert_eq!(&items[hook_len..], &original.items[..]);
        assert_eq!(
            items[hook_len - 2],
            CodeItem::Branch(BranchInstruction::IReturn)
        );
        match (&items[4], &items[hook_len - 1]) {
            (
                CodeItem::Branch(BranchInstruction::If(OrdComparison::EQ, skip)),
                CodeItem::Label(label),
            ) => assert_eq!(skip, label),
            other => panic!("unexpected prologue/epilogue {:?}", other),
        }
    }

    #[test]
    fn entry_select_maps_booleans_to_fields() {
        let access = BinaryName::from_string(String::from("app/Access")).unwrap();
        let field = |name: &str| {
            FieldRef::new(
                access.clone(),
                UnqualifiedName::from_string(name.to_owned()).unwrap(),
                FieldType::object(access.clone()),
            )
        };
        let target = Target::new(
            "getExpressionAccess",
            "(Ljava/lang/Object;)Lapp/Access;",
            TriggerShape::EntrySelect {
                slot: 1,
                if_true: field("Write"),
                if_false: field("Read"),
            },
        )
        .unwrap();
        let (emitter, target) = spec("()Z", target);
        let original = body(|_| {
            vec![
                CodeItem::Instruction(SymInstruction::AConstNull),
                CodeItem::Branch(BranchInstruction::AReturn),
            ]
        });

        let patched = run(&emitter, &target, &original).unwrap();
        let items = &patched.items;
        let write = position(items, &CodeItem::Instruction(SymInstruction::GetStatic(field("Write"))));
        let read = position(items, &CodeItem::Instruction(SymInstruction::GetStatic(field("Read"))));
        assert!(write < read);
        assert!(matches!(
            items[write - 1],
            CodeItem::Branch(BranchInstruction::If(OrdComparison::EQ, _))
        ));
        assert_eq!(items[read + 2], CodeItem::Branch(BranchInstruction::AReturn));
    }

    #[test]
    fn call_branch_hooks_at_the_jump_target() {
        let target = Target::new(
            "getNavigationOffset",
            "()I",
            TriggerShape::CallBranch { call: call_site() },
        )
        .unwrap();
        let (emitter, target) = spec("()I", target);

        let mut null_label = None;
        let original = body(|code| {
            let label = code.fresh_label();
            null_label = Some(label);
            vec![
                CodeItem::Instruction(SymInstruction::ALoad(0)),
                trigger_call(),
                CodeItem::Instruction(SymInstruction::AStore(1)),
                CodeItem::Instruction(SymInstruction::ALoad(1)),
                CodeItem::Branch(BranchInstruction::IfNull(EqComparison::NE, label)),
                CodeItem::Instruction(SymInstruction::IConst0),
                CodeItem::Branch(BranchInstruction::IReturn),
                CodeItem::Label(label),
                CodeItem::Instruction(SymInstruction::IConst1),
                CodeItem::Branch(BranchInstruction::IReturn),
            ]
        });
        let label = null_label.unwrap();

        let patched = run(&emitter, &target, &original).unwrap();
        let items = &patched.items;
        let label_at = position(items, &CodeItem::Label(label));
        assert_eq!(label_at, 7, "everything before the label is untouched");
        assert_eq!(&items[..8], &original.items[..8]);
        assert_eq!(items[8], CodeItem::Instruction(SymInstruction::ALoad(1)));

        // original tail follows the skip label
        let tail = &items[items.len() - 2..];
        assert_eq!(tail, &original.items[8..]);
        assert!(matches!(items[items.len() - 3], CodeItem::Label(_)));
        assert_eq!(
            items[items.len() - 4],
            CodeItem::Branch(BranchInstruction::IReturn)
        );
    }

    #[test]
    fn call_result_replaces_the_local() {
        let target = Target::new(
            "describe",
            "()Ljava/lang/String;",
            TriggerShape::CallResult { call: call_site() },
        )
        .unwrap();
        let (emitter, target) = spec("()Lcom/intellij/psi/PsiElement;", target);
        let original = body(|_| {
            vec![
                CodeItem::Instruction(SymInstruction::ALoad(0)),
                trigger_call(),
                CodeItem::Instruction(SymInstruction::AStore(2)),
                CodeItem::Instruction(SymInstruction::AConstNull),
                CodeItem::Branch(BranchInstruction::AReturn),
            ]
        });

        let patched = run(&emitter, &target, &original).unwrap();
        let items = &patched.items;
        assert_eq!(&items[..3], &original.items[..3]);
        assert_eq!(items[3], CodeItem::Instruction(SymInstruction::ALoad(2)));

        // store back, then skip label, then the rest of the original
        let n = items.len();
        assert_eq!(&items[n - 2..], &original.items[3..]);
        assert!(matches!(items[n - 3], CodeItem::Label(_)));
        assert_eq!(items[n - 4], CodeItem::Instruction(SymInstruction::AStore(2)));
        assert_eq!(
            items[n - 5],
            CodeItem::Instruction(SymInstruction::CheckCast(RefType::Object(
                BinaryName::from_string(String::from("com/intellij/psi/PsiElement")).unwrap()
            )))
        );
    }

    #[test]
    fn aggregate_concatenates_chunks() {
        let chunk = BinaryName::from_string(String::from("com/intellij/usages/TextChunk")).unwrap();
        let target = Target::new(
            "getPlainText",
            "()Ljava/lang/String;",
            TriggerShape::Aggregate {
                call: call_site(),
                chunk_owner: chunk.clone(),
                chunk_method: UnqualifiedName::from_string(String::from("getText")).unwrap(),
            },
        )
        .unwrap();
        let (emitter, target) = spec("()[Lcom/intellij/usages/TextChunk;", target);
        let original = body(|_| {
            vec![
                trigger_call(),
                CodeItem::Instruction(SymInstruction::AStore(1)),
                CodeItem::Instruction(SymInstruction::AConstNull),
                CodeItem::Branch(BranchInstruction::AReturn),
            ]
        });

        let patched = run(&emitter, &target, &original).unwrap();
        let items = &patched.items;
        position(items, &CodeItem::Instruction(SymInstruction::IStore(2)));
        position(items, &CodeItem::Instruction(SymInstruction::AStore(3)));
        position(items, &CodeItem::Instruction(SymInstruction::IInc(4, 1)));
        assert!(items.iter().any(|item| matches!(
            item,
            CodeItem::Instruction(SymInstruction::Invoke(InvokeType::Virtual, method))
                if method.class == RefType::Object(chunk.clone())
        )));
        assert!(items.iter().any(|item| matches!(
            item,
            CodeItem::Branch(BranchInstruction::IfICmp(OrdComparison::LT, _))
        )));
    }

    #[test]
    fn cache_stores_a_reference() {
        let owner = BinaryName::from_string(String::from("app/Adapter")).unwrap();
        let cache_field = FieldRef::new(
            owner,
            UnqualifiedName::from_string(String::from("myTextChunks")).unwrap(),
            TriggerShape::cache_field_type(),
        );
        let target = Target::new(
            "initChunks",
            "()[Lcom/intellij/usages/TextChunk;",
            TriggerShape::Cache {
                call: call_site(),
                cache_field: cache_field.clone(),
                reference_class: BinaryName::from_string(String::from(
                    "com/intellij/reference/SoftReference",
                ))
                .unwrap(),
            },
        )
        .unwrap();
        let (emitter, target) = spec("()[Lcom/intellij/usages/TextChunk;", target);
        let original = body(|_| {
            vec![
                trigger_call(),
                CodeItem::Instruction(SymInstruction::AStore(1)),
                CodeItem::Instruction(SymInstruction::AConstNull),
                CodeItem::Branch(BranchInstruction::AReturn),
            ]
        });

        let patched = run(&emitter, &target, &original).unwrap();
        let items = &patched.items;
        let put = position(items, &CodeItem::Instruction(SymInstruction::PutField(cache_field)));
        assert_eq!(items[put + 1], CodeItem::Instruction(SymInstruction::ALoad(1)));
        assert_eq!(items[put + 2], CodeItem::Branch(BranchInstruction::AReturn));
    }

    #[test]
    fn arguments_are_loaded_by_type() {
        let target = Target::new("isWrite", "(JLjava/lang/Object;)Z", TriggerShape::Entry { slot: 0 })
            .unwrap()
            .with_arguments(vec![1, 3]);
        let (emitter, target) = spec("(JLjava/lang/Object;)Z", target);
        let original = body(|_| {
            vec![
                CodeItem::Instruction(SymInstruction::IConst0),
                CodeItem::Branch(BranchInstruction::IReturn),
            ]
        });

        let patched = run(&emitter, &target, &original).unwrap();
        assert_eq!(
            &patched.items[5..8],
            &[
                CodeItem::Instruction(SymInstruction::ALoad(0)),
                CodeItem::Instruction(SymInstruction::LLoad(1)),
                CodeItem::Instruction(SymInstruction::ALoad(3)),
            ]
        );
    }

    #[test]
    fn missing_triggers_leave_the_body_alone() {
        let target = Target::new(
            "getNavigationOffset",
            "()I",
            TriggerShape::CallBranch { call: call_site() },
        )
        .unwrap();
        let (emitter, target) = spec("()I", target);

        // no call at all
        let original = body(|_| {
            vec![
                CodeItem::Instruction(SymInstruction::IConst0),
                CodeItem::Branch(BranchInstruction::IReturn),
            ]
        });
        assert!(run(&emitter, &target, &original).is_none());

        // the jump goes backwards, so its label never shows up afterwards
        let original = body(|code| {
            let top = code.fresh_label();
            vec![
                CodeItem::Label(top),
                trigger_call(),
                CodeItem::Instruction(SymInstruction::AStore(1)),
                CodeItem::Instruction(SymInstruction::ALoad(1)),
                CodeItem::Branch(BranchInstruction::IfNull(EqComparison::EQ, top)),
                CodeItem::Instruction(SymInstruction::IConst0),
                CodeItem::Branch(BranchInstruction::IReturn),
            ]
        });
        assert!(run(&emitter, &target, &original).is_none());
    }

    #[test]
    fn transitions_step_by_step() {
        let target = Target::new(
            "getNavigationOffset",
            "()I",
            TriggerShape::CallBranch { call: call_site() },
        )
        .unwrap();
        let (emitter, target) = spec("()I", target);
        let context = PatchContext {
            emitter: &emitter,
            target: &target,
        };
        let mut labels = SynLabelGenerator::default();
        let label = labels.fresh_label();

        let (state, emitted) =
            transition(&context, PatchState::new(labels), PatchEvent::MethodStart);
        assert_eq!(state.phase, Phase::WaitingForCall);
        assert!(emitted.is_empty());

        let call = trigger_call();
        let (state, emitted) = transition(&context, state, PatchEvent::Item(&call));
        assert_eq!(state.phase, Phase::WaitingForLocal);
        assert_eq!(emitted, vec![call.clone()]);

        // `iinc` is not what the trigger is waiting for
        let iinc = CodeItem::Instruction(SymInstruction::IInc(4, 1));
        let (state, _) = transition(&context, state, PatchEvent::Item(&iinc));
        assert_eq!(state.phase, Phase::WaitingForLocal);

        let store = CodeItem::Instruction(SymInstruction::AStore(2));
        let (state, _) = transition(&context, state, PatchEvent::Item(&store));
        assert_eq!(state.phase, Phase::WaitingForJump { slot: 2 });

        let jump = CodeItem::Branch(BranchInstruction::IfNull(EqComparison::NE, label));
        let (state, _) = transition(&context, state, PatchEvent::Item(&jump));
        assert_eq!(state.phase, Phase::WaitingForLabel { slot: 2, label });

        let (state, emitted) =
            transition(&context, state, PatchEvent::Item(&CodeItem::Label(label)));
        assert_eq!(state.phase, Phase::Done);
        assert_eq!(emitted[0], CodeItem::Label(label));
        assert_eq!(emitted[1], CodeItem::Instruction(SymInstruction::ALoad(2)));

        // once done, everything passes through
        let (state, emitted) = transition(&context, state, PatchEvent::Item(&call));
        assert_eq!(state.phase, Phase::Done);
        assert_eq!(emitted, vec![call]);
    }
}
