//! Textual format for describing a schema to build: the literal inputs `crat generate` reads.
//!
//! Nothing in the kept reference material defines such a format (the side tool that built
//! if-then-else graphs for the upstream compiler wasn't kept), so this one is new, modeled on the
//! rest of this workspace's line-oriented, DIMACS-flavored formats: a `p` header, `c` comments,
//! and zero-terminated directive lines.
//!
//! ```text
//! c four-variable mux, x <-> ite(s, a, b)
//! p schema 3
//! ite 1 2 3
//! root @1
//! ```
//!
//! A step line produces a value other steps and `root` can refer back to by position (`@1` is the
//! first step's result), in addition to referring directly to input variables by signed DIMACS
//! literal. `@k` can be negated the same way a literal can (`-@1`).
use std::io::{self, BufRead, Write};
use std::str::FromStr;

use thiserror::Error;

use crat_formula::Lit;

use crate::node::{Schema, XLit};
use crate::writer::Writer;
use crate::SchemaError;

/// A reference to either a schema input variable or a previously defined step's result.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ref {
    Input(Lit),
    /// 1-based index into the steps defined so far, with the sign of the reference.
    Step { index: usize, negated: bool },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Ite { cond: Ref, then_branch: Ref, else_branch: Ref },
    And { left: Ref, right: Ref },
    Root(Ref),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SchemaHeader {
    pub input_var_count: usize,
}

#[derive(Debug, Error)]
pub enum SchemaTextError {
    #[error("line {line}: missing 'p schema <var count>' header")]
    MissingHeader { line: usize },
    #[error("line {line}: malformed header, expected 'p schema <var count>'")]
    MalformedHeader { line: usize },
    #[error("line {line}: unknown directive '{command}'")]
    UnknownDirective { line: usize, command: String },
    #[error("line {line}: wrong number of operands for '{command}'")]
    WrongOperandCount { line: usize, command: String },
    #[error("line {line}: '{token}' is not a valid reference")]
    InvalidRef { line: usize, token: String },
    #[error("line {line}: reference '@{index}' points past the steps defined so far")]
    ForwardRef { line: usize, index: usize },
    #[error("{0}")]
    Io(#[from] io::Error),
}

fn parse_ref(line: usize, token: &str) -> Result<Ref, SchemaTextError> {
    let (negated, body) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    if let Some(index_str) = body.strip_prefix('@') {
        let index = usize::from_str(index_str)
            .map_err(|_| SchemaTextError::InvalidRef { line, token: token.to_owned() })?;
        if index == 0 {
            return Err(SchemaTextError::InvalidRef { line, token: token.to_owned() });
        }
        return Ok(Ref::Step { index, negated });
    }
    let dimacs = isize::from_str(token)
        .map_err(|_| SchemaTextError::InvalidRef { line, token: token.to_owned() })?;
    if dimacs == 0 {
        return Err(SchemaTextError::InvalidRef { line, token: token.to_owned() });
    }
    Ok(Ref::Input(Lit::from_dimacs(dimacs)))
}

/// Reads [`Step`]s from a schema description, skipping blank lines and `c` comments.
pub struct SchemaReader<R> {
    lines: io::Lines<R>,
    line_number: usize,
    /// Count of `ite`/`and` steps yielded so far (`root` never gets an index of its own), used to
    /// reject a `@k` reference to a step not yet defined.
    emitted: usize,
    pub header: SchemaHeader,
}

impl<R: BufRead> SchemaReader<R> {
    pub fn new(source: R) -> Result<Self, SchemaTextError> {
        let mut lines = source.lines();
        let mut line_number = 0;
        loop {
            line_number += 1;
            let line = lines
                .next()
                .ok_or(SchemaTextError::MissingHeader { line: line_number })??;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('c') {
                continue;
            }
            let mut tokens = trimmed.split_whitespace();
            if tokens.next() != Some("p") || tokens.next() != Some("schema") {
                return Err(SchemaTextError::MalformedHeader { line: line_number });
            }
            let input_var_count = tokens
                .next()
                .and_then(|t| usize::from_str(t).ok())
                .ok_or(SchemaTextError::MalformedHeader { line: line_number })?;
            if tokens.next().is_some() {
                return Err(SchemaTextError::MalformedHeader { line: line_number });
            }
            return Ok(SchemaReader {
                lines,
                line_number,
                emitted: 0,
                header: SchemaHeader { input_var_count },
            });
        }
    }

    fn next_step(&mut self) -> Result<Option<Step>, SchemaTextError> {
        loop {
            let line = match self.lines.next() {
                None => return Ok(None),
                Some(line) => line?,
            };
            self.line_number += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('c') {
                continue;
            }

            let mut tokens = trimmed.split_whitespace();
            let command = tokens.next().expect("non-empty line has a first token");
            let operands: Vec<&str> = tokens.collect();
            let line_no = self.line_number;
            let steps_so_far = self.emitted;

            let check_ref = |r: Ref| -> Result<Ref, SchemaTextError> {
                if let Ref::Step { index, .. } = r {
                    if index > steps_so_far {
                        return Err(SchemaTextError::ForwardRef { line: line_no, index });
                    }
                }
                Ok(r)
            };

            let step = match command {
                "ite" => {
                    if operands.len() != 3 {
                        return Err(SchemaTextError::WrongOperandCount {
                            line: line_no,
                            command: command.to_owned(),
                        });
                    }
                    Step::Ite {
                        cond: check_ref(parse_ref(line_no, operands[0])?)?,
                        then_branch: check_ref(parse_ref(line_no, operands[1])?)?,
                        else_branch: check_ref(parse_ref(line_no, operands[2])?)?,
                    }
                }
                "and" => {
                    if operands.len() != 2 {
                        return Err(SchemaTextError::WrongOperandCount {
                            line: line_no,
                            command: command.to_owned(),
                        });
                    }
                    Step::And {
                        left: check_ref(parse_ref(line_no, operands[0])?)?,
                        right: check_ref(parse_ref(line_no, operands[1])?)?,
                    }
                }
                "root" => {
                    if operands.len() != 1 {
                        return Err(SchemaTextError::WrongOperandCount {
                            line: line_no,
                            command: command.to_owned(),
                        });
                    }
                    Step::Root(check_ref(parse_ref(line_no, operands[0])?)?)
                }
                other => {
                    return Err(SchemaTextError::UnknownDirective {
                        line: line_no,
                        command: other.to_owned(),
                    })
                }
            };
            if matches!(step, Step::Ite { .. } | Step::And { .. }) {
                self.emitted += 1;
            }
            return Ok(Some(step));
        }
    }
}

impl<R: BufRead> Iterator for SchemaReader<R> {
    type Item = Result<Step, SchemaTextError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_step().transpose()
    }
}

impl From<SchemaTextError> for SchemaError {
    fn from(e: SchemaTextError) -> SchemaError {
        SchemaError::Other(e.to_string())
    }
}

/// Resolves a [`Ref`] against the input variable count and the results recorded for earlier
/// steps, building and writing nodes as needed.
fn resolve(input_var_count: usize, results: &[XLit], r: Ref) -> Result<XLit, SchemaError> {
    match r {
        Ref::Input(lit) => {
            if lit.var().index() >= input_var_count {
                return Err(SchemaError::Other(format!(
                    "reference to variable {} exceeds the declared input variable count {}",
                    lit.to_dimacs(),
                    input_var_count
                )));
            }
            Ok(XLit::Lit(lit))
        }
        Ref::Step { index, negated } => {
            let value = *results
                .get(index - 1)
                .ok_or_else(|| SchemaError::Other(format!("step @{} was never defined", index)))?;
            Ok(if negated { value.neg() } else { value })
        }
    }
}

/// Interprets a finished stream of [`Step`]s against `schema`, building and writing every node,
/// and returns the declared root's value.
pub fn build_from_steps(
    schema: &mut Schema,
    writer: &mut Writer<impl Write>,
    steps: &[Step],
) -> Result<XLit, SchemaError> {
    let input_var_count = schema.input_var_count();
    let mut results: Vec<XLit> = Vec::new();
    let mut root = None;

    for step in steps {
        match *step {
            Step::Ite { cond, then_branch, else_branch } => {
                let c = resolve(input_var_count, &results, cond)?;
                let t = resolve(input_var_count, &results, then_branch)?;
                let e = resolve(input_var_count, &results, else_branch)?;
                results.push(schema.mk_ite(writer, c, t, e)?);
            }
            Step::And { left, right } => {
                let l = resolve(input_var_count, &results, left)?;
                let r = resolve(input_var_count, &results, right)?;
                results.push(schema.mk_and(writer, l, r)?);
            }
            Step::Root(r) => {
                root = Some(resolve(input_var_count, &results, r)?);
            }
        }
    }

    root.ok_or_else(|| SchemaError::Other("schema description never declared a root".to_owned()))
}

/// Writes a schema description, mirroring [`SchemaReader`]'s grammar.
pub fn write_header(out: &mut impl Write, header: &SchemaHeader) -> io::Result<()> {
    writeln!(out, "p schema {}", header.input_var_count)
}

fn write_ref(out: &mut impl Write, r: Ref) -> io::Result<()> {
    match r {
        Ref::Input(lit) => write!(out, "{}", lit.to_dimacs()),
        Ref::Step { index, negated } => write!(out, "{}@{}", if negated { "-" } else { "" }, index),
    }
}

pub fn write_step(out: &mut impl Write, step: &Step) -> io::Result<()> {
    match step {
        Step::Ite { cond, then_branch, else_branch } => {
            write!(out, "ite ")?;
            write_ref(out, *cond)?;
            write!(out, " ")?;
            write_ref(out, *then_branch)?;
            write!(out, " ")?;
            write_ref(out, *else_branch)?;
            writeln!(out)
        }
        Step::And { left, right } => {
            write!(out, "and ")?;
            write_ref(out, *left)?;
            write!(out, " ")?;
            write_ref(out, *right)?;
            writeln!(out)
        }
        Step::Root(r) => {
            write!(out, "root ")?;
            write_ref(out, *r)?;
            writeln!(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn read_all(text: &str) -> (SchemaHeader, Vec<Step>) {
        let mut reader = SchemaReader::new(BufReader::new(text.as_bytes())).unwrap();
        let header = reader.header;
        let steps: Vec<Step> = (&mut reader).map(|r| r.unwrap()).collect();
        (header, steps)
    }

    #[test]
    fn parses_header_and_steps() {
        let (header, steps) = read_all("c a mux\np schema 3\nite 1 2 3\nroot @1\n");
        assert_eq!(header.input_var_count, 3);
        assert_eq!(
            steps,
            vec![
                Step::Ite {
                    cond: Ref::Input(Lit::from_dimacs(1)),
                    then_branch: Ref::Input(Lit::from_dimacs(2)),
                    else_branch: Ref::Input(Lit::from_dimacs(3)),
                },
                Step::Root(Ref::Step { index: 1, negated: false }),
            ]
        );
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let (_, steps) = read_all("p schema 1\n\nc comment\nand 1 -1\nroot @1\n");
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn negated_step_reference_parses() {
        let (_, steps) = read_all("p schema 2\nand 1 2\nroot -@1\n");
        assert_eq!(steps[1], Step::Root(Ref::Step { index: 1, negated: true }));
    }

    #[test]
    fn rejects_forward_reference() {
        let mut reader = SchemaReader::new(BufReader::new("p schema 2\nroot @1\n".as_bytes())).unwrap();
        assert!(reader.next().unwrap().is_err());
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(SchemaReader::new(BufReader::new("p cnf 1 2\n".as_bytes())).is_err());
    }

    #[test]
    fn rejects_unknown_directive() {
        let mut reader = SchemaReader::new(BufReader::new("p schema 1\nxor 1 2\n".as_bytes())).unwrap();
        assert!(reader.next().unwrap().is_err());
    }

    #[test]
    fn builds_schema_from_steps_and_returns_root() {
        let mut schema = Schema::new(3);
        let mut writer = Writer::new(Vec::new(), 0);
        let steps = vec![
            Step::Ite {
                cond: Ref::Input(Lit::from_dimacs(1)),
                then_branch: Ref::Input(Lit::from_dimacs(2)),
                else_branch: Ref::Input(Lit::from_dimacs(3)),
            },
            Step::Root(Ref::Step { index: 1, negated: false }),
        ];
        let root = build_from_steps(&mut schema, &mut writer, &steps).unwrap();
        assert!(schema.node(root.as_lit().unwrap().var()).is_some());
    }

    #[test]
    fn write_step_roundtrips_through_reader() {
        let steps = vec![
            Step::And {
                left: Ref::Input(Lit::from_dimacs(-2)),
                right: Ref::Step { index: 1, negated: true },
            },
            Step::Root(Ref::Step { index: 2, negated: false }),
        ];
        let mut buf = Vec::new();
        write_header(&mut buf, &SchemaHeader { input_var_count: 2 }).unwrap();
        for step in &steps {
            write_step(&mut buf, step).unwrap();
        }
        let (_, parsed) = read_all(std::str::from_utf8(&buf).unwrap());
        assert_eq!(parsed, steps);
    }
}
