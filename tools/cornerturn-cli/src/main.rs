use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use st_cornerturn::{
    init_tracing, rotation_cycles, valid_group, CycleStep, Dialect, KernelPlan, MaskPolicy,
};

type DynError = Box<dyn std::error::Error>;

#[derive(Parser)]
#[command(
    name = "cornerturn",
    about = "Generate lane-shuffle corner-turn kernels",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Cuda,
    Wgsl,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Cuda => Dialect::Cuda,
            DialectArg::Wgsl => Dialect::Wgsl,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Emit kernel source for one specialization.
    Emit {
        /// Kernel entry-point name.
        name: String,
        /// Input element type, CUDA-style (float, float2, uint4, ...).
        #[arg(long, default_value = "float")]
        input: String,
        /// Output element type; defaults to the input type.
        #[arg(long)]
        output: Option<String>,
        /// Lane-group size, 1 or a power of two.
        #[arg(long, default_value_t = 4)]
        lanes: usize,
        #[arg(long, value_enum, default_value_t = DialectArg::Cuda)]
        dialect: DialectArg,
        /// Transform line placed between the transposes; repeatable.
        /// Identity pass-through when omitted.
        #[arg(long = "transform")]
        transforms: Vec<String>,
        /// Explicit lane-mask expression (CUDA only).
        #[arg(long)]
        mask: Option<String>,
        /// Write the source here instead of stdout.
        #[arg(long)]
        out_file: Option<PathBuf>,
    },
    /// Print the register-permutation cycles behind each case.
    Cycles {
        /// Lane-group size, 1 or a power of two.
        lanes: usize,
        /// Single case index; all cases when omitted.
        #[arg(long)]
        case: Option<usize>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct CaseCycles {
    case: usize,
    cycles: Vec<Vec<CycleStep>>,
}

fn main() -> Result<(), DynError> {
    let _ = init_tracing();
    match Cli::parse().command {
        Command::Emit {
            name,
            input,
            output,
            lanes,
            dialect,
            transforms,
            mask,
            out_file,
        } => emit(
            &name,
            &input,
            output.as_deref(),
            lanes,
            dialect.into(),
            transforms,
            mask,
            out_file,
        ),
        Command::Cycles { lanes, case, json } => cycles(lanes, case, json),
    }
}

#[allow(clippy::too_many_arguments)]
fn emit(
    name: &str,
    input: &str,
    output: Option<&str>,
    lanes: usize,
    dialect: Dialect,
    transforms: Vec<String>,
    mask: Option<String>,
    out_file: Option<PathBuf>,
) -> Result<(), DynError> {
    let output = output.unwrap_or(input);
    let mut plan = KernelPlan::new(name, input, output, lanes)?;
    if let Some(expr) = mask {
        plan = plan.with_mask(MaskPolicy::Expr(expr));
    }
    let lines = if transforms.is_empty() {
        plan.identity_transforms(dialect)
    } else {
        transforms
    };
    for line in lines {
        plan = plan.with_transform(line);
    }
    let source = plan.emit(dialect)?;
    match out_file {
        Some(path) => fs::write(&path, source)?,
        None => print!("{source}"),
    }
    Ok(())
}

fn cycles(lanes: usize, case: Option<usize>, json: bool) -> Result<(), DynError> {
    if !valid_group(lanes) {
        return Err(format!("group size {lanes} must be 1 or a power of two").into());
    }
    let cases: Vec<usize> = match case {
        Some(c) => vec![c],
        None => (0..lanes).collect(),
    };
    let mut rows = Vec::with_capacity(cases.len());
    for case in cases {
        rows.push(CaseCycles {
            case,
            cycles: rotation_cycles(lanes, case)?,
        });
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for row in rows {
        println!("case {}:", row.case);
        for cycle in row.cycles {
            let pairs: Vec<String> = cycle
                .iter()
                .map(|step| format!("({} <- {})", step.dst, step.src))
                .collect();
            println!("  {}", pairs.join(" "));
        }
    }
    Ok(())
}
