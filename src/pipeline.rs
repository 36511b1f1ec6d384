//! The bootstrap order: binutils, kernel headers, a stage 1 compiler, glibc, the final compiler.
use std::fmt::Display;

use anyhow::{Context, Result};

use crate::{
    commands::{Executor, Step},
    interrupt,
    packages::{
        binutils::binutils_steps,
        gcc::{GccStage, gcc_steps},
        glibc::glibc_steps,
        linux::kernel_headers_steps,
    },
    profile::Toolchain,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Binutils,
    KernelHeaders,
    GccStage1,
    Glibc,
    GccFinal,
}

impl Stage {
    /// Every stage, in the order they run.
    pub const ALL: [Stage; 5] = [
        Stage::Binutils,
        Stage::KernelHeaders,
        Stage::GccStage1,
        Stage::Glibc,
        Stage::GccFinal,
    ];

    pub fn steps(&self, toolchain: &Toolchain, jobs: u64) -> Result<Vec<Step>> {
        match self {
            Stage::Binutils => binutils_steps(toolchain, jobs),
            Stage::KernelHeaders => kernel_headers_steps(toolchain),
            Stage::GccStage1 => gcc_steps(toolchain, jobs, GccStage::Stage1),
            Stage::Glibc => glibc_steps(toolchain, jobs),
            Stage::GccFinal => gcc_steps(toolchain, jobs, GccStage::Final),
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Binutils => write!(f, "binutils"),
            Stage::KernelHeaders => write!(f, "kernel headers"),
            Stage::GccStage1 => write!(f, "stage1 gcc"),
            Stage::Glibc => write!(f, "glibc"),
            Stage::GccFinal => write!(f, "final stage gcc"),
        }
    }
}

/// The steps of every stage, in order.
pub fn plan(toolchain: &Toolchain, jobs: u64) -> Result<Vec<(Stage, Vec<Step>)>> {
    Stage::ALL
        .iter()
        .map(|stage| Ok((*stage, stage.steps(toolchain, jobs)?)))
        .collect()
}

/// Run every stage. The first failing step aborts the run.
pub fn run(toolchain: &Toolchain, jobs: u64, executor: &mut impl Executor) -> Result<()> {
    for (stage, steps) in plan(toolchain, jobs)? {
        log::info!("=> {stage}");
        for step in &steps {
            interrupt::check()?;
            executor
                .execute(step)
                .context(format!("{stage} failed"))?;
        }
    }
    Ok(())
}
