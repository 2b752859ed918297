use crate::jvm::class_graph::ClassId;
use std::collections::HashSet;

/// Subtyping relationship between types
pub trait Assignable {
    /// Is the first type assignable to the second?
    fn is_assignable(&self, super_type: &Self) -> bool;
}

/// This does a traversal of super types in the class graph to determine assignability
impl<'g> Assignable for ClassId<'g> {
    fn is_assignable(&self, super_type: &ClassId<'g>) -> bool {
        let mut supertypes_to_visit: Vec<ClassId<'g>> = vec![*self];
        let mut dont_revisit: HashSet<ClassId<'g>> = HashSet::new();
        dont_revisit.insert(*self);

        // Interfaces never show up as superclasses
        let super_is_class: bool = !super_type.is_interface();

        while let Some(class) = supertypes_to_visit.pop() {
            if class == *super_type {
                return true;
            }

            if let Some(superclass) = class.0.superclass {
                if dont_revisit.insert(superclass) {
                    supertypes_to_visit.push(superclass);
                }
            }
            if !super_is_class {
                for interface in &class.0.interfaces {
                    if dont_revisit.insert(*interface) {
                        supertypes_to_visit.push(*interface);
                    }
                }
            }
        }

        false
    }
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::{Assignable, ClassGraph, ClassGraphArenas};
    use crate::jvm::{BinaryName, Name};

    #[test]
    fn classes() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::with_jdk_classes(&arenas);
        let object = graph.resolve(&BinaryName::OBJECT).unwrap();
        let integer = graph.resolve(&BinaryName::INTEGER).unwrap();
        let number = integer.superclass.unwrap();

        assert!(object.is_assignable(&object), "java.lang.Object <: java.lang.Object");
        assert!(integer.is_assignable(&number), "java.lang.Integer <: java.lang.Number");
        assert!(integer.is_assignable(&object), "java.lang.Integer <: java.lang.Object");
        assert!(!number.is_assignable(&integer), "java.lang.Number </: java.lang.Integer");
        assert!(!object.is_assignable(&number), "java.lang.Object </: java.lang.Number");
    }

    #[test]
    fn interfaces() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::with_jdk_classes(&arenas);
        let resolve = |name: &str| {
            graph
                .resolve(&BinaryName::from_string(String::from(name)).unwrap())
                .unwrap()
        };
        let object = resolve("java/lang/Object");
        let string = resolve("java/lang/String");
        let char_sequence = resolve("java/lang/CharSequence");
        let array_list = resolve("java/util/ArrayList");
        let iterable = resolve("java/lang/Iterable");

        assert!(string.is_assignable(&char_sequence), "java.lang.String <: java.lang.CharSequence");
        assert!(char_sequence.is_assignable(&object), "java.lang.CharSequence <: java.lang.Object");
        assert!(!char_sequence.is_assignable(&string), "java.lang.CharSequence </: java.lang.String");

        // inherited through a superclass and a super-interface
        assert!(array_list.is_assignable(&iterable), "java.util.ArrayList <: java.lang.Iterable");
        assert!(!iterable.is_assignable(&array_list), "java.lang.Iterable </: java.util.ArrayList");
    }
}
