//! Rewrite classes compiled from `tests/java`, then run them on a real JVM with full verification
//!
//! Skipped when `java` or `javac` can't be found.

use jvmhook::hook::{CallSite, HookSpec, Settings, Target, Transformer, TriggerShape};
use jvmhook::jvm::class_graph::{jdk_class_loaders, ClassPath};
use jvmhook::jvm::code::FieldRef;
use jvmhook::jvm::{BinaryName, FieldType, Name, UnqualifiedName};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

fn binary_name(name: &str) -> BinaryName {
    BinaryName::from_string(name.to_owned()).unwrap()
}

fn unqualified_name(name: &str) -> UnqualifiedName {
    UnqualifiedName::from_string(name.to_owned()).unwrap()
}

fn tool_available(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .output()
        .map_or(false, |output| output.status.success())
}

/// Installation directory of the `java` on the PATH
fn java_home() -> Option<PathBuf> {
    let output = Command::new("java")
        .args(["-XshowSettings:properties", "-version"])
        .output()
        .ok()?;
    let settings = String::from_utf8_lossy(&output.stderr);
    settings
        .lines()
        .filter_map(|line| line.trim().strip_prefix("java.home = "))
        .map(PathBuf::from)
        .next()
}

fn java_sources(directory: &Path, sources: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(directory).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            java_sources(&path, sources);
        } else if path.extension().map_or(false, |ext| ext == "java") {
            sources.push(path);
        }
    }
}

fn hook_specs() -> Vec<(BinaryName, HookSpec)> {
    let access = |name: &str| {
        FieldRef::new(
            binary_name("app/Access"),
            unqualified_name(name),
            FieldType::object(binary_name("app/Access")),
        )
    };
    let usage = HookSpec::new(
        "hooks.IWriteAccess",
        "isWriteAccess",
        "()Z",
        vec![
            Target::new("isWrite", "()Z", TriggerShape::Entry { slot: 0 }).unwrap(),
            Target::new(
                "access",
                "(Ljava/lang/Object;)Lapp/Access;",
                TriggerShape::EntrySelect {
                    slot: 1,
                    if_true: access("WRITE"),
                    if_false: access("READ"),
                },
            )
            .unwrap(),
        ],
    )
    .unwrap();

    let calculator = HookSpec::new(
        "hooks.ICompute",
        "combine",
        "(JLjava/lang/String;)Ljava/lang/Object;",
        vec![Target::new(
            "compute",
            "(JLjava/lang/String;)Ljava/lang/Object;",
            TriggerShape::Entry { slot: 0 },
        )
        .unwrap()
        .with_arguments(vec![1, 3])],
    )
    .unwrap();

    let usage_adapter = HookSpec::new(
        "hooks.INavigable",
        "navigationOffset",
        "()I",
        vec![Target::new(
            "getNavigationOffset",
            "()I",
            TriggerShape::CallBranch {
                call: CallSite::new("app/UsageAdapter", "getElement", "()Ljava/lang/Object;")
                    .unwrap(),
            },
        )
        .unwrap()],
    )
    .unwrap();

    let printer = HookSpec::new(
        "hooks.IReplacement",
        "replacement",
        "()Ljava/lang/Object;",
        vec![Target::new(
            "show",
            "()Ljava/lang/String;",
            TriggerShape::CallResult {
                call: CallSite::new("app/Printer", "getItem", "()Ljava/lang/Object;").unwrap(),
            },
        )
        .unwrap()],
    )
    .unwrap();

    let get_usage_info =
        || CallSite::new("app/UsageText", "getUsageInfo", "()Ljava/lang/Object;").unwrap();
    let usage_text = HookSpec::new(
        "hooks.ITextChunks",
        "textChunks",
        "()[Lapp/TextChunk;",
        vec![
            Target::new(
                "getPlainText",
                "()Ljava/lang/String;",
                TriggerShape::Aggregate {
                    call: get_usage_info(),
                    chunk_owner: binary_name("app/TextChunk"),
                    chunk_method: unqualified_name("getText"),
                },
            )
            .unwrap(),
            Target::new(
                "initChunks",
                "()[Lapp/TextChunk;",
                TriggerShape::Cache {
                    call: get_usage_info(),
                    cache_field: FieldRef::new(
                        binary_name("app/UsageText"),
                        unqualified_name("myTextChunks"),
                        TriggerShape::cache_field_type(),
                    ),
                    reference_class: binary_name("java/lang/ref/SoftReference"),
                },
            )
            .unwrap(),
        ],
    )
    .unwrap();

    // merges `ArrayList` and `LinkedList`, which only the JDK's own class library knows about
    let lists = HookSpec::new(
        "hooks.IReplacement",
        "replacement",
        "()Ljava/lang/Object;",
        vec![Target::new(
            "make",
            "(Ljava/lang/String;)Ljava/lang/Object;",
            TriggerShape::Entry { slot: 0 },
        )
        .unwrap()],
    )
    .unwrap();

    vec![
        (binary_name("app/Usage"), usage),
        (binary_name("app/Calculator"), calculator),
        (binary_name("app/UsageAdapter"), usage_adapter),
        (binary_name("app/Printer"), printer),
        (binary_name("app/UsageText"), usage_text),
        (binary_name("app/Lists"), lists),
    ]
}

#[test]
fn rewritten_classes_run_on_the_jvm() {
    if !tool_available("javac") || !tool_available("java") {
        eprintln!("skipping: no java or javac on the PATH");
        return;
    }
    let jdk_loaders = match java_home().map(|java_home| jdk_class_loaders(&java_home)) {
        Some(Ok(loaders)) => loaders,
        _ => {
            eprintln!("skipping: the JDK on the PATH has no readable class library");
            return;
        }
    };

    let sources_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("java");
    let classes = std::env::temp_dir().join(format!("jvmhook-jvm-{}", std::process::id()));
    fs::create_dir_all(&classes).unwrap();

    let mut sources = vec![];
    java_sources(&sources_dir, &mut sources);
    let status = Command::new("javac")
        .arg("-d")
        .arg(&classes)
        .args(&sources)
        .status()
        .unwrap();
    assert!(status.success(), "javac failed");

    let mut class_path = ClassPath::with_entries(vec![classes.clone()]).unwrap();
    for loader in jdk_loaders {
        class_path.push(loader);
    }
    let mut transformer = Transformer::new(Settings::new(), Box::new(class_path));
    let specs = hook_specs();
    for (class, spec) in specs.iter().cloned() {
        transformer.add_spec(class, spec);
    }
    for (class, _) in &specs {
        let path = classes.join(format!("{}.class", class.as_str()));
        let bytes = fs::read(&path).unwrap();
        match transformer.transform(&bytes).unwrap() {
            Cow::Owned(rewritten) => fs::write(&path, rewritten).unwrap(),
            Cow::Borrowed(_) => panic!("{} was passed through", class),
        }
    }

    let output = Command::new("java")
        .arg("-Xverify:all")
        .arg("-cp")
        .arg(&classes)
        .arg("app.Driver")
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "driver failed:\n{}\n{}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "entry false true",
            "entry-select none read write",
            "arguments original 1099511627776/x",
            "call-branch -1 0 42",
            "call-result plain replaced",
            "aggregate plain ab",
            "cache 0 false 2 true",
            "jdk-types ArrayList LinkedList replaced",
        ]
    );

    fs::remove_dir_all(&classes).unwrap();
}
