//! Stack map frame inference
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _stack
//! map frame_ (represented using [`Frame`]) and the set of stack map frames for all possible jump
//! targets in a method is the _stack map table_.
//!
//! The "types" used in verification (represented using [`VerificationType`]) are slightly
//! augmented to take into account initialization and null.
//!
//! When an instruction can be reached from multiple locations (eg. it is the target of jumps),
//! the frames from the different source locations need to be unified. Unifying two class types
//! means finding their closest common superclass, which is why inference needs a
//! [`TypeHierarchy`]. The whole thing is a fix-point computation (see [`infer_frames`]).
//!
//! The rules follow [verification by type-checking][0]. Unlike a real verifier though, inference
//! only checks what it needs to keep the frames well-formed: primitive types and value widths are
//! checked exactly, but any reference is accepted wherever a reference is expected.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod frame;
mod inference;
mod types;

pub use frame::*;
pub use inference::*;
pub use types::*;

use crate::jvm::{BinaryName, Error, FieldType, RefType};

/// Source of subclassing information used when merging frames
pub trait TypeHierarchy {
    /// Closest superclass shared by two classes
    ///
    /// When one class is assignable to the other (interfaces included), that other class is the
    /// answer. Otherwise a merge involving an interface ends up at `java/lang/Object`.
    fn common_superclass(&self, class1: &BinaryName, class2: &BinaryName)
        -> Result<BinaryName, Error>;

    /// Can a value of class `sub` be used where `sup` is expected?
    fn is_subclass(&self, sub: &BinaryName, sup: &BinaryName) -> Result<bool, Error> {
        if sub == sup || sup == &BinaryName::OBJECT {
            return Ok(true);
        }
        Ok(&self.common_superclass(sup, sub)? == sup)
    }
}

/// Can a reference of type `from` be used where `to` is expected?
///
/// Arrays are covariant in their reference elements and implement `Cloneable` and
/// `Serializable`. Unlike the verifier, an interface only accepts classes that implement it.
pub fn is_reference_assignable(
    hierarchy: &dyn TypeHierarchy,
    from: &RefType<BinaryName>,
    to: &RefType<BinaryName>,
) -> Result<bool, Error> {
    match (from, to) {
        (RefType::Object(from), RefType::Object(to)) => hierarchy.is_subclass(from, to),
        (_, RefType::Object(to)) => Ok(to == &BinaryName::OBJECT
            || to == &BinaryName::CLONEABLE
            || to == &BinaryName::SERIALIZABLE),
        (RefType::Object(_), _) => Ok(false),
        _ => match (from.element_type(), to.element_type()) {
            (Some(FieldType::Ref(from)), Some(FieldType::Ref(to))) => {
                is_reference_assignable(hierarchy, &from, &to)
            }
            (from, to) => Ok(from == to),
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas};
    use crate::jvm::parse_descriptor;

    fn ref_type(descriptor: &str) -> RefType<BinaryName> {
        parse_descriptor(descriptor).unwrap()
    }

    #[test]
    fn reference_assignability() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::with_jdk_classes(&arenas);
        let fits = |from: &str, to: &str| {
            is_reference_assignable(&graph, &ref_type(from), &ref_type(to)).unwrap()
        };

        assert!(fits("Ljava/lang/String;", "Ljava/lang/Object;"));
        assert!(fits("Ljava/lang/String;", "Ljava/lang/CharSequence;"));
        assert!(fits("Ljava/lang/Integer;", "Ljava/lang/Number;"));
        assert!(fits("Ljava/util/ArrayList;", "Ljava/util/List;"));
        assert!(!fits("Ljava/lang/Object;", "Ljava/lang/String;"));
        assert!(!fits("Ljava/lang/Number;", "Ljava/lang/Integer;"));
        assert!(!fits("Ljava/lang/Object;", "Ljava/lang/Runnable;"));

        assert!(fits("[Ljava/lang/String;", "Ljava/lang/Object;"));
        assert!(fits("[I", "Ljava/lang/Cloneable;"));
        assert!(fits("[Ljava/lang/String;", "[Ljava/lang/Object;"));
        assert!(fits("[[I", "[Ljava/lang/Object;"));
        assert!(!fits("[Ljava/lang/Object;", "[Ljava/lang/String;"));
        assert!(!fits("[I", "[J"));
        assert!(!fits("[I", "[Ljava/lang/Object;"));
        assert!(!fits("Ljava/lang/Object;", "[Ljava/lang/Object;"));
    }
}
