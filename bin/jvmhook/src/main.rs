mod spec_file;

use jvmhook::hook::{Error, LoaderSource, Settings, Transformer};
use jvmhook::jvm;
use jvmhook::jvm::class_graph::{jdk_class_loaders, ClassPath};

use clap::{value_parser, Arg, ArgAction, Command};
use std::borrow::Cow;
use std::env;
use std::fs;
use std::path::PathBuf;

fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = Command::new("JVM class hook injector")
        .version(clap::crate_version!())
        .about("Splice reflective interface hooks into compiled JVM classes")
        .arg(
            Arg::new("spec")
                .long("spec")
                .value_name("FILE")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Hook spec file saying which classes and methods to hook"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .value_name("FILE")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Where to write the (possibly unchanged) class"),
        )
        .arg(
            Arg::new("classpath")
                .long("classpath")
                .value_name("PATH")
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf))
                .help("Directory, jar, or jmod of classes consulted when merging types (repeatable)"),
        )
        .arg(
            Arg::new("jdk")
                .long("jdk")
                .value_name("JAVA_HOME")
                .value_parser(value_parser!(PathBuf))
                .help("JDK whose class library is consulted when merging types [default: $JAVA_HOME]"),
        )
        .arg(
            Arg::new("debug-dir")
                .long("debug-dir")
                .value_name("DIRECTORY")
                .value_parser(value_parser!(PathBuf))
                .help("Also dump every rewritten class under this directory"),
        )
        .arg(
            Arg::new("loader")
                .long("loader")
                .value_name("LOADER")
                .value_parser(|source: &str| source.parse::<LoaderSource>())
                .help("Class loader for the hook interface: defining, context, system, or plugin:<id>"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Class file to rewrite")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .index(1),
        )
        .get_matches();

    let mut settings = Settings::new();
    if let Some(loader) = matches.get_one::<LoaderSource>("loader") {
        settings.loader_source = loader.clone();
    }
    settings.debug_output_dir = matches.get_one::<PathBuf>("debug-dir").cloned();

    let mut class_path = ClassPath::with_entries(
        matches
            .get_many::<PathBuf>("classpath")
            .into_iter()
            .flatten()
            .cloned(),
    )?;
    if let Some(java_home) = matches.get_one::<PathBuf>("jdk") {
        log::info!("Using the class library of {}", java_home.display());
        for loader in jdk_class_loaders(java_home)? {
            class_path.push(loader);
        }
    } else if let Some(java_home) = env::var_os("JAVA_HOME").map(PathBuf::from) {
        match jdk_class_loaders(&java_home) {
            Ok(loaders) => {
                log::info!("Using the class library of {}", java_home.display());
                for loader in loaders {
                    class_path.push(loader);
                }
            }
            Err(err) => log::warn!("Ignoring JAVA_HOME={}: {}", java_home.display(), err),
        }
    }
    let mut transformer = Transformer::new(settings, Box::new(class_path));

    if let Some(spec_path) = matches.get_one::<PathBuf>("spec") {
        log::debug!("Reading hook spec '{}'", spec_path.display());
        let contents = fs::read_to_string(spec_path).map_err(jvm::Error::IoError)?;
        for (class, spec) in spec_file::parse_spec_file(&contents)? {
            if transformer.add_spec(class.clone(), spec).is_some() {
                log::warn!("Hook spec for {} given more than once, using the last", class);
            }
        }
    }

    if let (Some(input), Some(output)) = (
        matches.get_one::<PathBuf>("INPUT"),
        matches.get_one::<PathBuf>("output"),
    ) {
        log::info!("Reading '{}'", input.display());
        let bytes = fs::read(input).map_err(jvm::Error::IoError)?;
        let transformed = transformer.transform(&bytes)?;
        if let Cow::Borrowed(_) = transformed {
            log::info!("'{}' is passed through unchanged", input.display());
        }
        fs::write(output, &transformed).map_err(jvm::Error::IoError)?;
        log::info!("Wrote '{}'", output.display());
    }

    Ok(())
}
