//! Source fixes for old GCC releases that no longer build with a modern host compiler or
//! against a modern glibc.
//!
//! Fixes are plain text substitutions rather than `.patch` files so they keep working across the
//! slightly different trees of a GNU point release, a Linaro release and a release branch.
use std::{fmt::Display, path::Path};

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchId {
    /// GCC 4.9: `ubsan.c` compares a pointer against a char literal, which newer host compilers
    /// reject, and `libgcc` still names `struct ucontext`, which glibc 2.26 removed.
    Gcc49ModernHost,
}

/// Replace every occurrence of `find` with `replace` in `file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    pub file: &'static str,
    pub find: &'static str,
    pub replace: &'static str,
}

const GCC_49_MODERN_HOST: &[Edit] = &[
    Edit {
        file: "gcc/ubsan.c",
        find: "xloc.file == '\\0'",
        replace: "xloc.file[0] == '\\0'",
    },
    Edit {
        file: "libgcc/config/aarch64/linux-unwind.h",
        find: "struct ucontext ",
        replace: "ucontext_t ",
    },
    Edit {
        file: "libgcc/config/i386/linux-unwind.h",
        find: "struct ucontext ",
        replace: "ucontext_t ",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    AlreadyApplied,
    NotApplicable,
}

impl PatchId {
    pub fn name(&self) -> &'static str {
        match self {
            PatchId::Gcc49ModernHost => "gcc-4.9-modern-host",
        }
    }

    pub fn edits(&self) -> &'static [Edit] {
        match self {
            PatchId::Gcc49ModernHost => GCC_49_MODERN_HOST,
        }
    }

    /// Apply every edit to the GCC tree at `gcc_dir`.
    pub fn apply(&self, gcc_dir: impl AsRef<Path>) -> Result<()> {
        log::info!("=> patch {}", self.name());
        for edit in self.edits() {
            let outcome = edit
                .apply(gcc_dir.as_ref())
                .context(format!("applying `{}` to {}", self.name(), edit.file))?;
            log::debug!("{}: {:?}", edit.file, outcome);
        }
        Ok(())
    }
}

impl Display for PatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Edit {
    pub fn apply(&self, root: &Path) -> Result<EditOutcome> {
        let path = root.join(self.file);
        if !path.exists() {
            return Ok(EditOutcome::NotApplicable);
        }

        let contents = std::fs::read_to_string(&path)
            .context(format!("failed to read `{}`", path.display()))?;

        if !contents.contains(self.find) {
            return Ok(if contents.contains(self.replace) {
                EditOutcome::AlreadyApplied
            } else {
                EditOutcome::NotApplicable
            });
        }

        std::fs::write(&path, contents.replace(self.find, self.replace))
            .context(format!("failed to write `{}`", path.display()))?;
        Ok(EditOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_is_idempotent() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        std::fs::create_dir_all(dir.path().join("gcc"))?;
        let ubsan = dir.path().join("gcc/ubsan.c");
        std::fs::write(
            &ubsan,
            "if (xloc.file == NULL || xloc.file == '\\0' || xloc.line == 0)\n",
        )?;

        let edit = GCC_49_MODERN_HOST[0];
        assert_eq!(edit.apply(dir.path())?, EditOutcome::Applied);
        assert_eq!(
            std::fs::read_to_string(&ubsan)?,
            "if (xloc.file == NULL || xloc.file[0] == '\\0' || xloc.line == 0)\n"
        );
        assert_eq!(edit.apply(dir.path())?, EditOutcome::AlreadyApplied);
        Ok(())
    }

    #[test]
    fn missing_files_are_skipped() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        PatchId::Gcc49ModernHost.apply(dir.path())?;
        assert_eq!(
            GCC_49_MODERN_HOST[1].apply(dir.path())?,
            EditOutcome::NotApplicable
        );
        Ok(())
    }

    #[test]
    fn ucontext_is_renamed() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let header = dir.path().join("libgcc/config/i386/linux-unwind.h");
        std::fs::create_dir_all(header.parent().unwrap())?;
        std::fs::write(&header, "      struct ucontext *uc_ = context->cfa;\n")?;

        PatchId::Gcc49ModernHost.apply(dir.path())?;
        assert_eq!(
            std::fs::read_to_string(&header)?,
            "      ucontext_t *uc_ = context->cfa;\n"
        );
        Ok(())
    }
}
