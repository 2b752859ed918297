use super::*;
use crate::jvm::code::{CodeItem, MethodCode, SynLabel};
use crate::jvm::{FieldType, MethodDescriptor, RefType, UnqualifiedName, VerifierErrorKind};
use crate::util::Width;
use std::collections::HashMap;

/// Result of running frame inference over a method body
#[derive(Debug)]
pub struct InferredFrames {
    /// Frame on entry to every item of the method body (`None` if the item is unreachable)
    pub frames: Vec<Option<VFrame>>,

    /// Deepest the stack gets, in slots
    pub max_stack: usize,

    /// Number of local variable slots used
    pub max_locals: usize,
}

impl InferredFrames {
    pub fn is_reachable(&self, item: usize) -> bool {
        matches!(self.frames.get(item), Some(Some(_)))
    }
}

/// Method whose body is being typed
pub struct MethodContext<'a> {
    pub this_class: &'a BinaryName,
    pub name: &'a UnqualifiedName,
    pub descriptor: &'a MethodDescriptor<BinaryName>,
    pub is_static: bool,
}

/// Infer the frame at every point in a method body
///
/// This is a worklist algorithm: starting from the frame at the method entry, the effect of every
/// reachable item is computed and the resulting frame is merged into the frames of all of the
/// item's successors. Any successor whose frame changed is reprocessed. Items inside the range of
/// an exception handler also flow into the handler, with the stack replaced by the caught
/// exception.
pub fn infer_frames(
    code: &MethodCode,
    method: &MethodContext<'_>,
    hierarchy: &dyn TypeHierarchy,
) -> Result<InferredFrames, Error> {
    let positions = label_positions(code)?;
    let position = |label: &SynLabel| -> Result<usize, Error> {
        positions
            .get(label)
            .copied()
            .ok_or_else(|| Error::Malformed(format!("undefined label {:?}", label)))
    };

    // Exception handlers covering each item
    let mut handlers: Vec<Vec<(usize, VType)>> = vec![vec![]; code.items.len()];
    for block in &code.exception_handlers {
        let start = position(&block.start)?;
        let end = position(&block.end)?;
        let handler = position(&block.handler)?;
        let caught = VType::object(
            block
                .catch_type
                .clone()
                .unwrap_or(BinaryName::THROWABLE),
        );
        for covered in handlers.iter_mut().take(end).skip(start) {
            covered.push((handler, caught.clone()));
        }
    }

    let return_type = &method.descriptor.return_type;
    let initial = VFrame::initial(
        method.this_class,
        method.name,
        method.descriptor,
        method.is_static,
    );
    let mut max_locals = initial.locals.len();
    let mut max_stack = 0;

    let mut frames: Vec<Option<VFrame>> = vec![None; code.items.len()];
    let mut worklist: Vec<usize> = vec![];
    if code.items.is_empty() {
        return Err(Error::VerifierError {
            item: 0,
            instruction: String::from("<empty method body>"),
            kind: VerifierErrorKind::FallsOffEnd,
        });
    }
    frames[0] = Some(initial);
    worklist.push(0);

    while let Some(item) = worklist.pop() {
        let frame_in = match &frames[item] {
            Some(frame) => frame.clone(),
            None => continue,
        };

        let mut frame_out = frame_in.clone();
        let mut successors: Vec<usize> = vec![];
        let falls_through = match &code.items[item] {
            CodeItem::Label(_) | CodeItem::LineNumber(_) => true,
            CodeItem::Instruction(insn) => {
                frame_out
                    .execute(item, insn, method.this_class)
                    .map_err(|kind| Error::VerifierError {
                        item,
                        instruction: format!("{:?}", insn),
                        kind,
                    })?;
                true
            }
            CodeItem::Branch(branch) => {
                frame_out
                    .execute_branch(branch, return_type)
                    .map_err(|kind| Error::VerifierError {
                        item,
                        instruction: format!("{:?}", branch),
                        kind,
                    })?;
                for target in branch.jump_targets() {
                    successors.push(position(target)?);
                }
                branch.falls_through()
            }
        };

        if falls_through {
            if item + 1 >= code.items.len() {
                return Err(Error::VerifierError {
                    item,
                    instruction: format!("{:?}", code.items[item]),
                    kind: VerifierErrorKind::FallsOffEnd,
                });
            }
            successors.push(item + 1);
        }

        max_stack = max_stack.max(frame_in.stack_depth()).max(frame_out.stack_depth());
        max_locals = max_locals.max(frame_out.locals.len());

        for successor in successors {
            merge_into(&mut frames, &mut worklist, successor, &frame_out, hierarchy)?;
        }

        let is_instruction = matches!(
            code.items[item],
            CodeItem::Instruction(_) | CodeItem::Branch(_)
        );
        if is_instruction {
            for (handler, caught) in &handlers[item] {
                for locals in [&frame_in.locals, &frame_out.locals] {
                    let handler_frame = Frame {
                        locals: locals.clone(),
                        stack: std::iter::once(caught.clone()).collect(),
                    };
                    max_stack = max_stack.max(handler_frame.stack_depth());
                    merge_into(&mut frames, &mut worklist, *handler, &handler_frame, hierarchy)?;
                }
            }
        }
    }

    Ok(InferredFrames {
        frames,
        max_stack,
        max_locals,
    })
}

/// Position of every label, rejecting labels that are placed twice
fn label_positions(code: &MethodCode) -> Result<HashMap<SynLabel, usize>, Error> {
    let mut positions = HashMap::new();
    for (position, item) in code.items.iter().enumerate() {
        if let CodeItem::Label(label) = item {
            if positions.insert(*label, position).is_some() {
                return Err(Error::Malformed(format!("label {:?} placed twice", label)));
            }
        }
    }
    Ok(positions)
}

fn merge_into(
    frames: &mut [Option<VFrame>],
    worklist: &mut Vec<usize>,
    target: usize,
    incoming: &VFrame,
    hierarchy: &dyn TypeHierarchy,
) -> Result<(), Error> {
    let merged = match &frames[target] {
        None => incoming.clone(),
        Some(existing) => {
            let merged = merge_frames(existing, incoming, target, hierarchy)?;
            if merged == *existing {
                return Ok(());
            }
            merged
        }
    };
    frames[target] = Some(merged);
    worklist.push(target);
    Ok(())
}

/// Unify the frames of two control flow paths reaching the same item
///
/// Locals that can't be unified become `Top`. The stacks must have the same shape.
pub fn merge_frames(
    existing: &VFrame,
    incoming: &VFrame,
    item: usize,
    hierarchy: &dyn TypeHierarchy,
) -> Result<VFrame, Error> {
    if existing.stack.len() != incoming.stack.len() {
        return Err(Error::IncompatibleFrames {
            item,
            details: format!(
                "stack heights differ: {:?} vs. {:?}",
                existing.stack, incoming.stack
            ),
        });
    }
    let stack = existing
        .stack
        .iter()
        .zip(incoming.stack.iter())
        .map(|((_, _, t1), (_, _, t2))| {
            merge_types(t1, t2, hierarchy)?.ok_or_else(|| Error::IncompatibleFrames {
                item,
                details: format!("cannot merge stack types {:?} and {:?}", t1, t2),
            })
        })
        .collect::<Result<_, Error>>()?;

    let locals_len = existing.locals.len().max(incoming.locals.len());
    let mut locals = Vec::with_capacity(locals_len);
    let mut slot = 0;
    while slot < locals_len {
        let t1 = existing.locals.get(slot).unwrap_or(&VerificationType::Top);
        let t2 = incoming.locals.get(slot).unwrap_or(&VerificationType::Top);
        let merged = merge_types(t1, t2, hierarchy)?.unwrap_or(VerificationType::Top);
        let width = merged.width();
        locals.push(merged);
        if width == 2 {
            locals.push(VerificationType::Top);
        }
        slot += width;
    }
    while locals.last() == Some(&VerificationType::Top) {
        locals.pop();
    }

    Ok(Frame { locals, stack })
}

/// Most specific type both arguments are assignable to (`None` if there is no such type)
fn merge_types(
    t1: &VType,
    t2: &VType,
    hierarchy: &dyn TypeHierarchy,
) -> Result<Option<VType>, Error> {
    use VerificationType::*;

    Ok(match (t1, t2) {
        _ if t1 == t2 => Some(t1.clone()),
        (Null, Object(_)) => Some(t2.clone()),
        (Object(_), Null) => Some(t1.clone()),
        (Object(r1), Object(r2)) => Some(Object(merge_ref_types(r1, r2, hierarchy)?)),
        _ => None,
    })
}

fn merge_ref_types(
    r1: &RefType<BinaryName>,
    r2: &RefType<BinaryName>,
    hierarchy: &dyn TypeHierarchy,
) -> Result<RefType<BinaryName>, Error> {
    if r1 == r2 {
        return Ok(r1.clone());
    }
    Ok(match (r1, r2) {
        (RefType::Object(c1), RefType::Object(c2)) => {
            RefType::Object(hierarchy.common_superclass(c1, c2)?)
        }

        // Arrays are covariant in reference element types
        (
            RefType::ObjectArray(_) | RefType::PrimitiveArray(_),
            RefType::ObjectArray(_) | RefType::PrimitiveArray(_),
        ) => match (r1.element_type(), r2.element_type()) {
            (Some(FieldType::Ref(e1)), Some(FieldType::Ref(e2))) => {
                RefType::array(FieldType::Ref(merge_ref_types(&e1, &e2, hierarchy)?))
            }
            _ => RefType::Object(BinaryName::OBJECT),
        },

        _ => RefType::Object(BinaryName::OBJECT),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{BranchInstruction, Instruction, OrdComparison, TryCatchBlock};
    use crate::jvm::code::FieldRef;
    use crate::jvm::Name;
    use VerificationType::*;

    /// Hierarchy in which `a/B` and `a/C` both extend `a/A`
    struct Letters;

    impl TypeHierarchy for Letters {
        fn common_superclass(
            &self,
            class1: &BinaryName,
            class2: &BinaryName,
        ) -> Result<BinaryName, Error> {
            let in_a = |name: &BinaryName| name.as_str().starts_with("a/");
            if in_a(class1) && in_a(class2) {
                Ok(name("a/A"))
            } else {
                Ok(BinaryName::OBJECT)
            }
        }
    }

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_owned()).unwrap()
    }

    fn infer(
        code: &MethodCode,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Result<InferredFrames, Error> {
        let this_class = name("a/Main");
        let method_name = UnqualifiedName::from_string(String::from("run")).unwrap();
        let context = MethodContext {
            this_class: &this_class,
            name: &method_name,
            descriptor,
            is_static: true,
        };
        infer_frames(code, &context, &Letters)
    }

    fn load_static(class: &str) -> CodeItem {
        CodeItem::Instruction(Instruction::GetStatic(FieldRef::new(
            name("a/Main"),
            UnqualifiedName::from_string(String::from("field")).unwrap(),
            FieldType::object(name(class)),
        )))
    }

    #[test]
    fn branches_merge_to_common_superclass() {
        let mut code = MethodCode::new();
        let other = code.fresh_label();
        let join = code.fresh_label();
        code.items = vec![
            CodeItem::Instruction(Instruction::ILoad(0)),
            CodeItem::Branch(BranchInstruction::If(OrdComparison::EQ, other)),
            load_static("a/B"),
            CodeItem::Branch(BranchInstruction::Goto(join)),
            CodeItem::Label(other),
            load_static("a/C"),
            CodeItem::Label(join),
            CodeItem::Branch(BranchInstruction::AReturn),
        ];
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: Some(FieldType::object(BinaryName::OBJECT)),
        };
        let inferred = infer(&code, &descriptor).unwrap();
        let at_join = inferred.frames[7].as_ref().unwrap();
        assert_eq!(
            at_join.stack.iter().map(|(_, _, t)| t.clone()).collect::<Vec<_>>(),
            vec![VType::object(name("a/A"))]
        );
        assert_eq!(inferred.max_stack, 1);
        assert_eq!(inferred.max_locals, 1);
    }

    #[test]
    fn conflicting_locals_become_top() {
        let mut code = MethodCode::new();
        let join = code.fresh_label();
        code.items = vec![
            CodeItem::Instruction(Instruction::LConst0),
            CodeItem::Instruction(Instruction::LStore(1)),
            CodeItem::Instruction(Instruction::ILoad(0)),
            CodeItem::Branch(BranchInstruction::If(OrdComparison::EQ, join)),
            CodeItem::Instruction(Instruction::FConst0),
            CodeItem::Instruction(Instruction::FStore(1)),
            CodeItem::Label(join),
            CodeItem::Branch(BranchInstruction::Return),
        ];
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: None,
        };
        let inferred = infer(&code, &descriptor).unwrap();
        assert_eq!(inferred.frames[7].as_ref().unwrap().locals, vec![Integer]);
        assert_eq!(inferred.max_locals, 3);
        assert_eq!(inferred.max_stack, 2);
    }

    #[test]
    fn unreachable_code_has_no_frame() {
        let code = MethodCode {
            items: vec![
                CodeItem::Branch(BranchInstruction::Return),
                CodeItem::Instruction(Instruction::IConst0),
                CodeItem::Branch(BranchInstruction::IReturn),
            ],
            ..MethodCode::new()
        };
        let descriptor = MethodDescriptor {
            parameters: vec![],
            return_type: None,
        };
        let inferred = infer(&code, &descriptor).unwrap();
        assert!(inferred.is_reachable(0));
        assert!(!inferred.is_reachable(1));
        assert!(!inferred.is_reachable(2));
    }

    #[test]
    fn falling_off_the_end() {
        let code = MethodCode {
            items: vec![CodeItem::Instruction(Instruction::Nop)],
            ..MethodCode::new()
        };
        let descriptor = MethodDescriptor {
            parameters: vec![],
            return_type: None,
        };
        assert!(matches!(
            infer(&code, &descriptor),
            Err(Error::VerifierError {
                kind: VerifierErrorKind::FallsOffEnd,
                ..
            })
        ));
    }

    #[test]
    fn mismatched_stacks_are_rejected() {
        let mut code = MethodCode::new();
        let join = code.fresh_label();
        code.items = vec![
            CodeItem::Instruction(Instruction::IConst0),
            CodeItem::Instruction(Instruction::ILoad(0)),
            CodeItem::Branch(BranchInstruction::If(OrdComparison::EQ, join)),
            CodeItem::Instruction(Instruction::Pop),
            CodeItem::Instruction(Instruction::FConst0),
            CodeItem::Label(join),
            CodeItem::Branch(BranchInstruction::Return),
        ];
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: None,
        };
        assert!(matches!(
            infer(&code, &descriptor),
            Err(Error::IncompatibleFrames { item: 5, .. })
        ));
    }

    #[test]
    fn handlers_see_the_caught_exception() {
        let mut code = MethodCode::new();
        let start = code.fresh_label();
        let end = code.fresh_label();
        let handler = code.fresh_label();
        code.items = vec![
            CodeItem::Label(start),
            CodeItem::Instruction(Instruction::AConstNull),
            CodeItem::Branch(BranchInstruction::AThrow),
            CodeItem::Label(end),
            CodeItem::Label(handler),
            CodeItem::Branch(BranchInstruction::AThrow),
        ];
        code.exception_handlers.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: Some(name("a/Oops")),
        });
        let descriptor = MethodDescriptor {
            parameters: vec![],
            return_type: None,
        };
        let inferred = infer(&code, &descriptor).unwrap();
        let at_handler = inferred.frames[4].as_ref().unwrap();
        assert_eq!(
            at_handler.stack.iter().map(|(_, _, t)| t.clone()).collect::<Vec<_>>(),
            vec![VType::object(name("a/Oops"))]
        );
        assert!(!inferred.is_reachable(3));
    }

    #[test]
    fn array_merges() {
        let strings = RefType::array(FieldType::object(BinaryName::STRING));
        let classes = RefType::array(FieldType::object(BinaryName::CLASS));
        let ints = RefType::array(FieldType::int());
        assert_eq!(
            merge_ref_types(&strings, &classes, &Letters).unwrap(),
            RefType::array(FieldType::object(BinaryName::OBJECT))
        );
        assert_eq!(
            merge_ref_types(&strings, &ints, &Letters).unwrap(),
            RefType::Object(BinaryName::OBJECT)
        );
        assert_eq!(
            merge_types(&Null, &Object(ints.clone()), &Letters).unwrap(),
            Some(Object(ints))
        );
        assert_eq!(merge_types(&Integer, &Float, &Letters).unwrap(), None);
    }
}
