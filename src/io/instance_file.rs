// src/io/instance_file.rs

//! Instance files.
//!
//! The text format is a small subset of AMPL data files:
//!
//! ```text
//! set C := 1 2 3;
//! param q :=
//!     1 25.0
//!     2 30.0;
//! param sMin := 0;
//! namespace t0
//! {
//!     set P := 2 3;
//!     param h := 1;
//! }
//! ```
//!
//! Global entries describe the lots and inventory bounds; namespace `tK`
//! describes stage `K`. Files ending in `.json` are read and written with
//! serde instead.

use crate::error::{Result, SddpError};
use crate::model::instance::{Instance, Lot, Scenario, StageData};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Assign,
    Semicolon,
    Open,
    Close,
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Set(Vec<String>),
    Scalar(f64),
    Indexed(Vec<(String, f64)>),
}

type Block = HashMap<String, (usize, Entry)>;

fn parse_error(line: usize, message: impl Into<String>) -> SddpError {
    SddpError::Parse {
        line,
        message: message.into(),
    }
}

fn tokenize(text: &str) -> Vec<(usize, Token)> {
    let mut tokens = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line_no = number + 1;
        let content = line.split('#').next().unwrap_or("");
        let mut word = String::new();
        let mut chars = content.chars().peekable();
        while let Some(c) = chars.next() {
            let symbol = match c {
                ';' => Some(Token::Semicolon),
                '{' => Some(Token::Open),
                '}' => Some(Token::Close),
                ':' if chars.peek() == Some(&'=') => {
                    chars.next();
                    Some(Token::Assign)
                }
                c if c.is_whitespace() => None,
                c => {
                    word.push(c);
                    continue;
                }
            };
            if !word.is_empty() {
                tokens.push((line_no, Token::Word(std::mem::take(&mut word))));
            }
            if let Some(symbol) = symbol {
                tokens.push((line_no, symbol));
            }
        }
        if !word.is_empty() {
            tokens.push((line_no, Token::Word(word)));
        }
    }
    tokens
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    position: usize,
}

impl Parser {
    fn line(&self) -> usize {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map_or(1, |(line, _)| *line)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).map(|(_, t)| t.clone());
        self.position += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        let line = self.line();
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(parse_error(line, format!("expected {:?}, found {:?}", expected, other))),
        }
    }

    fn word(&mut self) -> Result<String> {
        let line = self.line();
        match self.next() {
            Some(Token::Word(word)) => Ok(word),
            other => Err(parse_error(line, format!("expected a name or value, found {:?}", other))),
        }
    }

    /// Words up to the closing semicolon.
    fn values(&mut self) -> Result<Vec<String>> {
        let mut values = Vec::new();
        loop {
            let line = self.line();
            match self.next() {
                Some(Token::Semicolon) => return Ok(values),
                Some(Token::Word(word)) => values.push(word),
                other => return Err(parse_error(line, format!("unterminated statement at {:?}", other))),
            }
        }
    }

    /// Statements until `}` (inside a namespace) or the end of input.
    fn block(&mut self, nested: bool, namespaces: &mut BTreeMap<usize, Block>) -> Result<Block> {
        let mut block = Block::new();
        loop {
            let line = self.line();
            let keyword = match self.next() {
                None if nested => return Err(parse_error(line, "missing closing brace")),
                None => return Ok(block),
                Some(Token::Close) if nested => return Ok(block),
                Some(Token::Word(word)) => word,
                Some(other) => return Err(parse_error(line, format!("unexpected {:?}", other))),
            };

            match keyword.as_str() {
                "set" | "param" => {
                    let name = self.word()?;
                    self.expect(Token::Assign)?;
                    let values = self.values()?;
                    let entry = if keyword == "set" {
                        Entry::Set(values)
                    } else {
                        param_entry(line, &name, &values)?
                    };
                    if block.insert(name.clone(), (line, entry)).is_some() {
                        return Err(parse_error(line, format!("{} defined twice", name)));
                    }
                }
                "namespace" if !nested => {
                    let name = self.word()?;
                    let stage = name
                        .strip_prefix('t')
                        .and_then(|k| k.parse::<usize>().ok())
                        .ok_or_else(|| parse_error(line, format!("namespace {} is not of the form tK", name)))?;
                    self.expect(Token::Open)?;
                    let inner = self.block(true, namespaces)?;
                    if namespaces.insert(stage, inner).is_some() {
                        return Err(parse_error(line, format!("namespace {} defined twice", name)));
                    }
                }
                other => return Err(parse_error(line, format!("unknown statement {}", other))),
            }
        }
    }
}

fn number(line: usize, text: &str) -> Result<f64> {
    text.parse::<f64>()
        .map_err(|_| parse_error(line, format!("{} is not a number", text)))
}

fn param_entry(line: usize, name: &str, values: &[String]) -> Result<Entry> {
    match values {
        [single] => Ok(Entry::Scalar(number(line, single)?)),
        _ if !values.is_empty() && values.len() % 2 == 0 => values
            .chunks(2)
            .map(|pair| -> Result<(String, f64)> { Ok((pair[0].clone(), number(line, &pair[1])?)) })
            .collect::<Result<Vec<_>>>()
            .map(Entry::Indexed),
        _ => Err(parse_error(line, format!("param {} needs one value or index/value pairs", name))),
    }
}

/// Typed lookups into one block.
struct View<'a> {
    block: &'a Block,
    scope: String,
    line: usize,
}

impl<'a> View<'a> {
    fn missing(&self, name: &str) -> SddpError {
        parse_error(self.line, format!("{}: missing {}", self.scope, name))
    }

    fn set(&self, name: &str) -> Result<Option<&'a [String]>> {
        match self.block.get(name) {
            None => Ok(None),
            Some((_, Entry::Set(values))) => Ok(Some(values.as_slice())),
            Some((line, _)) => Err(parse_error(*line, format!("{} must be a set", name))),
        }
    }

    fn scalar(&self, name: &str) -> Result<Option<f64>> {
        match self.block.get(name) {
            None => Ok(None),
            Some((_, Entry::Scalar(value))) => Ok(Some(*value)),
            Some((line, _)) => Err(parse_error(*line, format!("{} must be a single value", name))),
        }
    }

    fn required_scalar(&self, name: &str) -> Result<f64> {
        self.scalar(name)?.ok_or_else(|| self.missing(name))
    }

    /// Indexed param as a label map.
    fn table(&self, name: &str) -> Result<HashMap<&'a str, f64>> {
        match self.block.get(name) {
            Some((_, Entry::Indexed(pairs))) => Ok(pairs.iter().map(|(k, v)| (k.as_str(), *v)).collect()),
            Some((line, _)) => Err(parse_error(*line, format!("{} must be indexed", name))),
            None => Err(self.missing(name)),
        }
    }
}

fn lookup(table: &HashMap<&str, f64>, name: &str, label: &str, line: usize) -> Result<f64> {
    table
        .get(label)
        .copied()
        .ok_or_else(|| parse_error(line, format!("{} has no value for {}", name, label)))
}

/// Parses the text format.
pub fn parse_dat(text: &str) -> Result<Instance> {
    let mut parser = Parser {
        tokens: tokenize(text),
        position: 0,
    };
    let mut namespaces = BTreeMap::new();
    let global_block = parser.block(false, &mut namespaces)?;
    let global = View {
        block: &global_block,
        scope: "global".to_string(),
        line: 1,
    };

    let labels = global.set("C")?.ok_or_else(|| global.missing("C"))?;
    let q = global.table("q")?;
    let ca = global.table("ca")?;
    let cc = global.table("cc")?;
    let cp = global.table("cp")?;
    let mut lots = Vec::with_capacity(labels.len());
    let mut index: HashMap<&str, usize> = HashMap::new();
    for label in labels {
        let id = label
            .parse::<u32>()
            .map_err(|_| parse_error(1, format!("lot label {} is not a non-negative integer", label)))?;
        index.insert(label.as_str(), lots.len());
        lots.push(Lot {
            id,
            volume: lookup(&q, "q", label, 1)?,
            acquisition_cost: lookup(&ca, "ca", label, 1)?,
            cancellation_cost: lookup(&cc, "cc", label, 1)?,
            postponement_cost: lookup(&cp, "cp", label, 1)?,
        });
    }

    let horizon = namespaces.len();
    if namespaces.keys().copied().ne(0..horizon) {
        return Err(parse_error(1, "stage namespaces must be t0, t1, ... without gaps"));
    }

    let resolve = |view: &View, name: &str| -> Result<Vec<usize>> {
        view.set(name)?
            .unwrap_or(&[])
            .iter()
            .map(|label| {
                index
                    .get(label.as_str())
                    .copied()
                    .ok_or_else(|| parse_error(view.line, format!("{}: {} lists unknown lot {}", view.scope, name, label)))
            })
            .collect()
    };

    let mut stages: Vec<StageData> = Vec::with_capacity(horizon);
    let mut initial_arrivals = Vec::new();
    let mut initial_inventory = None;
    for (t, block) in &namespaces {
        let t = *t;
        let line = block.values().map(|(line, _)| *line).min().unwrap_or(1);
        let view = View {
            block,
            scope: format!("namespace t{}", t),
            line,
        };

        let purchasable = resolve(&view, "P")?;
        let committed = resolve(&view, "A")?;
        let arriving = resolve(&view, "AAnt")?;
        if t == 0 {
            initial_arrivals = arriving;
            initial_inventory = Some(view.required_scalar("s0")?);
        } else {
            let expect_same = |name: &str, written: &[usize], derived: &[usize]| -> Result<()> {
                let mut a = written.to_vec();
                let mut b = derived.to_vec();
                a.sort_unstable();
                b.sort_unstable();
                if a == b {
                    Ok(())
                } else {
                    Err(parse_error(line, format!("namespace t{}: {} disagrees with earlier stages", t, name)))
                }
            };
            expect_same("AAnt", &arriving, &stages[t - 1].committed)?;
            expect_same("PAnt", &resolve(&view, "PAnt")?, &stages[t - 1].purchasable)?;
            let two_back: &[usize] = if t >= 2 { &stages[t - 2].committed } else { &[] };
            expect_same("A2Ant", &resolve(&view, "A2Ant")?, two_back)?;
        }

        let scenario_labels = view.set("S")?.ok_or_else(|| view.missing("S"))?;
        let p = view.table("p")?;
        let d = view.table("d")?;
        let scenarios = scenario_labels
            .iter()
            .map(|label| -> Result<Scenario> {
                Ok(Scenario {
                    probability: lookup(&p, "p", label, line)?,
                    demand: lookup(&d, "d", label, line)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        stages.push(StageData {
            holding_cost: view.required_scalar("h")?,
            purchasable,
            committed,
            scenarios,
        });
    }

    Ok(Instance {
        lots,
        inventory_min: global.required_scalar("sMin")?,
        inventory_max: global.required_scalar("sMax")?,
        initial_inventory: initial_inventory.ok_or_else(|| parse_error(1, "no stage namespaces"))?,
        initial_arrivals,
        stages,
    })
}

/// Renders `instance` in the text format.
pub fn to_dat(instance: &Instance) -> String {
    let mut out = String::new();
    let label = |c: &usize| instance.lots[*c].id.to_string();
    let write_set = |out: &mut String, indent: &str, name: &str, labels: Vec<String>| {
        let _ = writeln!(out, "{}set {} := {};", indent, name, labels.join(" "));
    };
    let write_table = |out: &mut String, indent: &str, name: &str, rows: Vec<(String, f64)>| {
        let _ = write!(out, "{}param {} :=", indent, name);
        for (key, value) in rows {
            let _ = write!(out, "\n{}    {} {}", indent, key, value);
        }
        out.push_str(";\n");
    };
    let lot_table = |value: fn(&Lot) -> f64| -> Vec<(String, f64)> {
        instance.lots.iter().map(|lot| (lot.id.to_string(), value(lot))).collect()
    };

    write_set(&mut out, "", "C", instance.lots.iter().map(|lot| lot.id.to_string()).collect());
    out.push('\n');
    write_table(&mut out, "", "q", lot_table(|lot| lot.volume));
    write_table(&mut out, "", "ca", lot_table(|lot| lot.acquisition_cost));
    write_table(&mut out, "", "cc", lot_table(|lot| lot.cancellation_cost));
    write_table(&mut out, "", "cp", lot_table(|lot| lot.postponement_cost));
    let _ = writeln!(out, "param sMin := {};", instance.inventory_min);
    let _ = writeln!(out, "param sMax := {};", instance.inventory_max);

    let indent = "    ";
    for (t, stage) in instance.stages.iter().enumerate() {
        let _ = write!(out, "\nnamespace t{}\n{{\n", t);
        let sets = [
            ("A", stage.committed.as_slice()),
            ("AAnt", instance.arriving(t)),
            ("A2Ant", instance.postponable_into(t)),
            ("P", stage.purchasable.as_slice()),
            ("PAnt", instance.previously_purchasable(t)),
        ];
        for (name, lots) in sets {
            if !lots.is_empty() {
                write_set(&mut out, indent, name, lots.iter().map(label).collect());
            }
        }
        let scenario_labels: Vec<String> = (1..=stage.scenarios.len()).map(|s| s.to_string()).collect();
        write_set(&mut out, indent, "S", scenario_labels.clone());
        out.push('\n');
        write_table(
            &mut out,
            indent,
            "p",
            scenario_labels.iter().cloned().zip(stage.scenarios.iter().map(|s| s.probability)).collect(),
        );
        write_table(
            &mut out,
            indent,
            "d",
            scenario_labels.into_iter().zip(stage.scenarios.iter().map(|s| s.demand)).collect(),
        );
        let _ = writeln!(out, "{}param h := {};", indent, stage.holding_cost);
        if t == 0 {
            let _ = writeln!(out, "{}param s0 := {};", indent, instance.initial_inventory);
        }
        out.push_str("}\n");
    }
    out
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
}

/// Reads an instance, choosing the format by extension.
pub fn load_instance(path: impl AsRef<Path>) -> Result<Instance> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let instance = if is_json(path) {
        serde_json::from_str(&text)?
    } else {
        parse_dat(&text)?
    };
    log::debug!("loaded {} ({} stages)", path.display(), instance.horizon());
    Ok(instance)
}

pub fn save_instance(path: impl AsRef<Path>, instance: &Instance) -> Result<()> {
    let path = path.as_ref();
    if is_json(path) {
        fs::write(path, serde_json::to_string_pretty(instance)?)?;
    } else {
        fs::write(path, to_dat(instance))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::instance::fixtures::small_instance;

    const SAMPLE: &str = "\
set C := 1 2 3;

param q :=
    1 25.00
    2 30.00
    3 20.00;
param ca :=
    1 180
    2 200
    3 170;
param cc :=
    1 40
    2 40
    3 40;
param cp :=
    1 8
    2 8
    3 8;
param sMin := 0;
param sMax := 80;

namespace t0
{
    set A := 2;
    set AAnt := 1;
    set P := 3;
    set S := 1;

    param p :=
        1 1.0000000000;
    param d :=
        1 30.00;
    param h := 1;
    param s0 := 20;
}

namespace t1
{
    set AAnt := 2;
    set PAnt := 3;
    set S := 1 2;

    param p :=
        1 0.4
        2 0.6;
    param d :=
        1 20
        2 45;
    param h := 1;
}
";

    #[test]
    fn parses_namespaced_file() {
        let instance = parse_dat(SAMPLE).unwrap();
        assert_eq!(instance.lots.len(), 3);
        assert_eq!(instance.lots[1].volume, 30.0);
        assert_eq!(instance.initial_arrivals, vec![0]);
        assert_eq!(instance.initial_inventory, 20.0);
        assert_eq!(instance.stages.len(), 2);
        assert_eq!(instance.stages[0].committed, vec![1]);
        assert_eq!(instance.stages[0].purchasable, vec![2]);
        assert_eq!(instance.stages[1].scenarios[1].demand, 45.0);
        assert!(instance.validate().is_ok());
    }

    #[test]
    fn inconsistent_inherited_set_is_rejected() {
        let broken = SAMPLE.replace("set AAnt := 2;", "set AAnt := 3;");
        let err = parse_dat(&broken).unwrap_err();
        assert!(matches!(err, SddpError::Parse { ref message, .. } if message.contains("AAnt")));
    }

    #[test]
    fn reports_line_of_bad_number() {
        let broken = SAMPLE.replace("param sMax := 80;", "param sMax := eighty;");
        match parse_dat(&broken) {
            Err(SddpError::Parse { line, .. }) => assert_eq!(line, 20),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn written_text_reads_back() {
        let instance = small_instance();
        let text = to_dat(&instance);
        assert_eq!(parse_dat(&text).unwrap(), instance);
    }

    #[test]
    fn comments_are_ignored() {
        let commented = format!("# generated\n{}", SAMPLE.replace("param h := 1;", "param h := 1; # holding"));
        assert!(parse_dat(&commented).is_ok());
    }
}
