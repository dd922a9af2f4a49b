//! Line-oriented shell: each line becomes one control method call.

use serde_json::{json, Value};

pub const HELP: &str = "\
commands:
  start [input] [output]      open devices and start streaming
  stop                        stop streaming
  tone <description>          ask the language model for a chain
  cancel                      forget the pending tone request
  move <from> <to>            reorder units
  bypass <index> on|off       bypass or enable a unit
  set <index> <param> <value> change a parameter
  add <kind> [index]          insert a unit (appends by default)
  rm <index>                  remove a unit
  load <path>                 load a preset
  save <path> [name]          save the chain as a preset
  chain | state | kinds       show the chain, session or effect palette
  events [since]              show logged events
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ShellLine {
    Empty,
    Help,
    Call { method: &'static str, params: Value },
}

fn index(word: Option<&str>, what: &str) -> Result<usize, String> {
    let word = word.ok_or_else(|| format!("missing {}", what))?;
    word.parse().map_err(|_| format!("{} must be a non-negative integer, got '{}'", what, word))
}

fn word<'a>(word: Option<&'a str>, what: &str) -> Result<&'a str, String> {
    word.ok_or_else(|| format!("missing {}", what))
}

pub fn parse_line(line: &str) -> Result<ShellLine, String> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let mut words = rest.split_whitespace();

    let call = |method: &'static str, params: Value| Ok(ShellLine::Call { method, params });
    match head.to_lowercase().as_str() {
        "" => Ok(ShellLine::Empty),
        "help" | "?" => Ok(ShellLine::Help),
        "start" => call("start", json!({ "input": words.next(), "output": words.next() })),
        "stop" => call("stop", json!({})),
        "tone" => {
            if rest.is_empty() {
                return Err("missing tone description".to_string());
            }
            call("tone", json!({ "description": rest }))
        }
        "cancel" => call("cancel_tone", json!({})),
        "move" | "reorder" => {
            let from = index(words.next(), "from")?;
            let to = index(words.next(), "to")?;
            call("reorder", json!({ "from": from, "to": to }))
        }
        "bypass" => {
            let index = index(words.next(), "index")?;
            let bypassed = match words.next().unwrap_or("on") {
                "on" | "true" | "1" => true,
                "off" | "false" | "0" => false,
                other => return Err(format!("expected on or off, got '{}'", other)),
            };
            call("set_bypass", json!({ "index": index, "bypassed": bypassed }))
        }
        "set" => {
            let index = index(words.next(), "index")?;
            let name = word(words.next(), "parameter name")?;
            let raw = word(words.next(), "value")?;
            let value: f64 = raw.parse().map_err(|_| format!("value must be a number, got '{}'", raw))?;
            call("set_param", json!({ "index": index, "name": name, "value": value }))
        }
        "add" => {
            let kind = word(words.next(), "effect kind")?;
            let at = words.next().map(|w| index(Some(w), "index")).transpose()?;
            call("add_unit", json!({ "kind": kind, "index": at }))
        }
        "rm" | "remove" => call("remove_unit", json!({ "index": index(words.next(), "index")? })),
        "load" => call("load_preset", json!({ "path": word(words.next(), "path")? })),
        "save" => {
            let path = word(words.next(), "path")?;
            call("save_preset", json!({ "path": path, "name": words.next() }))
        }
        "chain" => call("get_chain", json!({})),
        "state" => call("get_state", json!({})),
        "kinds" => call("list_kinds", json!({})),
        "events" => {
            let since = words.next().map(|w| index(Some(w), "since")).transpose()?.unwrap_or(0);
            call("get_events", json!({ "since_id": since }))
        }
        "quit" | "exit" => call("shutdown", json!({})),
        other => Err(format!("unknown command '{}', try 'help'", other)),
    }
}
