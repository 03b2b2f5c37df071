use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use log::info;

use crat_checker::Checker;
use crat_dimacs::DimacsParser;
use crat_formula::clean_clause;
use crat_schema::reasoner::{DualReasoner, LocalReasoner};
use crat_schema::text::{build_from_steps, SchemaReader, Step};
use crat_schema::{validate::validate, Schema, Writer};

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ReasonerKind {
    /// Hand-rolled unit propagation, falling back to the internal search oracle. Production
    /// default.
    Local,
    /// Cross-checks every call against an independent search, logging disagreements. Roughly
    /// doubles the cost; kept for debugging the reasoner itself.
    Dual,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// The input CNF formula the generated proof must be justified against.
    #[arg(short = 'i', long = "input", value_name = "FILE.cnf")]
    input: PathBuf,

    /// The counting schema description to build and validate.
    #[arg(short = 's', long = "schema", value_name = "FILE.schema")]
    schema: PathBuf,

    /// Where to write the generated CRAT proof (stdout if omitted).
    #[arg(short = 'o', long = "output", value_name = "FILE.crat")]
    output: Option<PathBuf>,

    /// Which reasoner justifies literal facts while validating the schema.
    #[arg(long = "reasoner", value_enum, default_value = "local")]
    reasoner: ReasonerKind,

    /// Re-check the generated proof against the input formula before reporting success.
    #[arg(long = "self-check")]
    self_check: bool,

    /// Print diagnostic summary information; repeat for `c`-prefixed proof comments naming the
    /// node each clause asserts.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

pub fn generate_main(args: GenerateArgs) -> anyhow::Result<i32> {
    info!("Reading CNF file '{}'", args.input.display());
    let cnf_file = File::open(&args.input)?;
    let formula = DimacsParser::parse(BufReader::new(cnf_file))?;

    let mut input_clauses = Vec::with_capacity(formula.len());
    for clause in formula.iter() {
        let cleaned = clean_clause(clause)
            .ok_or_else(|| anyhow::anyhow!("input clause {:?} is tautological", clause))?;
        input_clauses.push(cleaned);
    }
    let input_clause_count = input_clauses.len() as u64;

    info!("Reading schema description '{}'", args.schema.display());
    let schema_file = File::open(&args.schema)?;
    let mut reader = SchemaReader::new(BufReader::new(schema_file))?;
    let steps: Vec<Step> = (&mut reader).collect::<Result<_, _>>()?;

    let mut schema = Schema::new(reader.header.input_var_count.max(formula.var_count()));

    let out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    let mut writer = Writer::with_verbosity(out, input_clause_count, args.verbose);

    let root = build_from_steps(&mut schema, &mut writer, &steps)?;

    let stats = match args.reasoner {
        ReasonerKind::Local => {
            let mut reasoner = LocalReasoner::new();
            validate(&schema, &mut reasoner, &mut writer, &input_clauses, input_clause_count, root)?
        }
        ReasonerKind::Dual => {
            let mut reasoner = DualReasoner::new();
            validate(&schema, &mut reasoner, &mut writer, &input_clauses, input_clause_count, root)?
        }
    };

    let mut out = writer.into_inner();
    out.flush()?;
    drop(out);

    info!(
        "generated proof: {} AND visits ({} clauses), {} OR visits ({} clauses), {} justification clauses",
        stats.and_visits, stats.and_clauses, stats.or_visits, stats.or_clauses, stats.justification_clauses
    );

    if args.self_check {
        self_check(&args)?;
    }

    println!("PROOF GENERATED");
    Ok(0)
}

/// Replays the generated proof through [`Checker`] as an independent sanity check, mirroring the
/// teacher's solver `--self-check` idiom.
fn self_check(args: &GenerateArgs) -> anyhow::Result<()> {
    let path = args
        .output
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("--self-check requires -o/--output, so the proof can be re-read"))?;

    let cnf_file = File::open(&args.input)?;
    let mut checker = Checker::from_dimacs(BufReader::new(cnf_file))?;
    let proof_file = File::open(path)?;
    checker.check_proof(BufReader::new(proof_file))?;
    info!("self-check passed: generated proof verifies against '{}'", args.input.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn generates_and_self_checks_an_ite_schema() {
        let cnf = write_file("p cnf 3 2\n1 0\n2 0\n");
        let schema = write_file("p schema 3\nite 1 2 3\nroot @1\n");
        let output = tempfile::NamedTempFile::new().unwrap();

        let args = GenerateArgs {
            input: cnf.path().to_path_buf(),
            schema: schema.path().to_path_buf(),
            output: Some(output.path().to_path_buf()),
            reasoner: ReasonerKind::Local,
            self_check: true,
            verbose: 0,
        };
        assert_eq!(generate_main(args).unwrap(), 0);
    }

    #[test]
    fn generates_with_dual_reasoner() {
        let cnf = write_file("p cnf 3 2\n1 0\n2 0\n");
        let schema = write_file("p schema 3\nite 1 2 3\nroot @1\n");
        let output = tempfile::NamedTempFile::new().unwrap();

        let args = GenerateArgs {
            input: cnf.path().to_path_buf(),
            schema: schema.path().to_path_buf(),
            output: Some(output.path().to_path_buf()),
            reasoner: ReasonerKind::Dual,
            self_check: false,
            verbose: 2,
        };
        assert_eq!(generate_main(args).unwrap(), 0);
    }
}
