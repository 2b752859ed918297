use super::LoaderSource;
use crate::jvm::MethodAccessFlags;
use std::path::PathBuf;

pub struct Settings {
    /// How the patched static initializer finds the loader for the external interface
    pub loader_source: LoaderSource,

    /// Also write every rewritten class under this directory (eg. `dir/net/example/Foo.class`)
    ///
    /// Failing to write there is logged, but doesn't fail the rewrite.
    pub debug_output_dir: Option<PathBuf>,

    /// Access flags of a static initializer that has to be created from scratch
    pub clinit_access_flags: MethodAccessFlags,

    /// Emit `StackMapTable` even for class files older than Java 6
    ///
    /// Those versions are checked by the old type-inferring verifier, which ignores the
    /// attribute. Max stack and max locals get recomputed either way.
    pub compute_frames_below_java6: bool,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            loader_source: LoaderSource::DefiningLoader,
            debug_output_dir: None,
            clinit_access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            compute_frames_below_java6: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::new()
    }
}
