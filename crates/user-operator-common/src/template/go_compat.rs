//! Go text/template compatibility
//!
//! Policies are often written for Go's text/template. Before parsing, every
//! `{{ }}` action in Go syntax is rewritten into the equivalent minijinja
//! source:
//!
//! | Go | minijinja |
//! |---|---|
//! | `{{ .Username }}`, `{{ $.Extra.dept }}` | `{{ Username }}`, `{{ Extra.dept }}` |
//! | `{{ if P }}` / `{{ else if P }}` / `{{ else }}` / `{{ end }}` | `{% if %}` / `{% elif %}` / `{% else %}` / `{% endif %}` |
//! | `{{ range P }}`, `{{ range $i, $v := P }}` | `{% for %}` over index/value (or key/value) pairs |
//! | `{{ with P }}` | `{% with %}` plus `{% if %}` |
//! | `{{ $x := P }}` | `{% set x = P %}` |
//! | `index`, `len`, `eq`, `ne`, `lt`, `le`, `gt`, `ge`, `and`, `or`, `not`, `print` | subscripts, `length` and operators |
//! | `{{ .Username \| upper }}`, `{{ default "x" .Extra.shell }}` | filter calls |
//! | `{{/* comment */}}`, `{{-` / `-}}` | `{# #}` and the same trim markers |
//!
//! Inside `range` and `with`, `.` is the current element as in Go. Actions
//! that are already minijinja expressions (`{{ Extra.dept[0] }}`,
//! `{{ Username | default('x') }}`) pass through with leading dots stripped,
//! and `{% %}` tags are left to minijinja apart from the same dot stripping.
//! `printf`, `define`, `template` and `block` are not supported and fail
//! with a syntax error.

/// Filter that turns a list or map into `[index, value]` / `[key, value]`
/// pairs for translated `range` actions
pub(super) const RANGE_FILTER: &str = "range_pairs";

const KEYWORDS: &[&str] = &[
    "if", "else", "end", "range", "with", "define", "template", "block", "break", "continue",
];

const FUNCTIONS: &[&str] = &[
    "index", "len", "eq", "ne", "lt", "le", "gt", "ge", "and", "or", "not", "print",
];

/// Rewrite Go actions in `template` into minijinja syntax
pub(super) fn translate(template: &str) -> Result<String, String> {
    Translator::default().run(template)
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    /// `.A.B`; an empty path is `.` itself
    Field(Vec<String>),
    /// `$name.A.B`; an empty name is `$`
    Var(String, Vec<String>),
    Ident(String),
    /// String literal, already quoted for minijinja
    Str(String),
    Number(String),
    Pipe,
    LParen,
    RParen,
    Declare,
    Assign,
    Comma,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BlockKind {
    If,
    Range,
    With,
}

impl BlockKind {
    fn keyword(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Range => "range",
            Self::With => "with",
        }
    }
}

struct Frame {
    kind: BlockKind,
    /// What `.` means inside the block; `None` is the template root
    dot: Option<String>,
    outer: Option<String>,
}

#[derive(Default)]
struct Translator {
    frames: Vec<Frame>,
    generated: usize,
}

impl Translator {
    fn run(mut self, template: &str) -> Result<String, String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = find_tag_open(rest) {
            out.push_str(&rest[..start]);
            let open = &rest[start..start + 2];
            let close = match open {
                "{%" => "%}",
                "{#" => "#}",
                _ => "}}",
            };
            let after = &rest[start + 2..];
            let Some(end) = after.find(close) else {
                // unterminated, minijinja reports it
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };

            let body = &after[..end];
            match open {
                "{{" => out.push_str(&self.action(body)?),
                "{%" => {
                    out.push_str("{%");
                    out.push_str(&strip_leading_dots(body));
                    out.push_str("%}");
                }
                _ => out.push_str(&rest[start..start + 2 + end + 2]),
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);

        if let Some(frame) = self.frames.last() {
            return Err(format!(
                "unclosed {{{{ {} }}}} action, missing {{{{ end }}}}",
                frame.kind.keyword()
            ));
        }
        Ok(out)
    }

    fn action(&mut self, body: &str) -> Result<String, String> {
        let (trim_left, inner, trim_right) = split_trim(body);
        let inner = inner.trim();

        if let Some(comment) = inner.strip_prefix("/*").and_then(|c| c.strip_suffix("*/")) {
            return Ok(format!(
                "{{#{}{}{}#}}",
                dash(trim_left),
                comment,
                dash(trim_right)
            ));
        }

        let passthrough = || format!("{{{{{}}}}}", strip_leading_dots(body));
        let Ok(tokens) = tokenize(inner) else {
            return Ok(passthrough());
        };

        match tokens.as_slice() {
            [Token::Ident(word), rest @ ..] if KEYWORDS.contains(&word.as_str()) => {
                self.control(word, rest, trim_left, trim_right)
            }
            [Token::Var(name, path), Token::Declare | Token::Assign, rest @ ..] => {
                if name.is_empty() || !path.is_empty() {
                    return Err("only plain $variables can be assigned".to_string());
                }
                let value = self.pipeline(rest)?;
                Ok(statement(trim_left, &format!("set {} = {}", name, value), trim_right))
            }
            _ if looks_like_go(&tokens) => match self.pipeline(&tokens) {
                Ok(value) => Ok(expression(trim_left, &value, trim_right)),
                Err(_) => Ok(passthrough()),
            },
            _ => Ok(passthrough()),
        }
    }

    fn control(
        &mut self,
        word: &str,
        rest: &[Token],
        trim_left: bool,
        trim_right: bool,
    ) -> Result<String, String> {
        match word {
            "if" => {
                let condition = self.pipeline(rest)?;
                let dot = self.dot();
                self.frames.push(Frame {
                    kind: BlockKind::If,
                    dot: dot.clone(),
                    outer: dot,
                });
                Ok(statement(trim_left, &format!("if {}", condition), trim_right))
            }
            "else" => self.else_branch(rest, trim_left, trim_right),
            "end" => {
                if !rest.is_empty() {
                    return Err("{{ end }} takes no arguments".to_string());
                }
                let frame = self
                    .frames
                    .pop()
                    .ok_or_else(|| "unexpected {{ end }}".to_string())?;
                Ok(match frame.kind {
                    BlockKind::If => statement(trim_left, "endif", trim_right),
                    BlockKind::Range => statement(trim_left, "endfor", trim_right),
                    BlockKind::With => format!(
                        "{}{}",
                        statement(trim_left, "endif", false),
                        statement(false, "endwith", trim_right)
                    ),
                })
            }
            "range" => {
                let (vars, source) = split_declaration(rest)?;
                let source = self.pipeline(source)?;
                let (index, value) = match vars.as_slice() {
                    [] => ("_".to_string(), self.fresh()),
                    [value] => ("_".to_string(), value.clone()),
                    [index, value] => (index.clone(), value.clone()),
                    _ => return Err("range declares at most two variables".to_string()),
                };
                let outer = self.dot();
                self.frames.push(Frame {
                    kind: BlockKind::Range,
                    dot: Some(value.clone()),
                    outer,
                });
                Ok(statement(
                    trim_left,
                    &format!("for {}, {} in {}|{}", index, value, source, RANGE_FILTER),
                    trim_right,
                ))
            }
            "with" => {
                let (vars, source) = split_declaration(rest)?;
                let source = self.pipeline(source)?;
                let name = match vars.as_slice() {
                    [] => self.fresh(),
                    [name] => name.clone(),
                    _ => return Err("with declares at most one variable".to_string()),
                };
                let outer = self.dot();
                self.frames.push(Frame {
                    kind: BlockKind::With,
                    dot: Some(name.clone()),
                    outer,
                });
                Ok(format!(
                    "{}{}",
                    statement(trim_left, &format!("with {} = {}", name, source), false),
                    statement(false, &format!("if {}", name), trim_right)
                ))
            }
            other => Err(format!("{{{{ {} }}}} is not supported", other)),
        }
    }

    fn else_branch(
        &mut self,
        rest: &[Token],
        trim_left: bool,
        trim_right: bool,
    ) -> Result<String, String> {
        let kind = self
            .frames
            .last()
            .map(|f| f.kind)
            .ok_or_else(|| "unexpected {{ else }}".to_string())?;

        match rest {
            [] => {
                // the else branch of range/with sees the outer dot
                if let Some(frame) = self.frames.last_mut() {
                    if frame.kind != BlockKind::If {
                        frame.dot = frame.outer.clone();
                    }
                }
                Ok(statement(trim_left, "else", trim_right))
            }
            [Token::Ident(word), condition @ ..] if word == "if" && kind == BlockKind::If => {
                let condition = self.pipeline(condition)?;
                Ok(statement(trim_left, &format!("elif {}", condition), trim_right))
            }
            _ => Err(format!(
                "only a plain {{{{ else }}}} is supported inside {{{{ {} }}}}",
                kind.keyword()
            )),
        }
    }

    fn dot(&self) -> Option<String> {
        self.frames.last().and_then(|f| f.dot.clone())
    }

    fn fresh(&mut self) -> String {
        self.generated += 1;
        format!("_dot{}", self.generated)
    }

    fn pipeline(&self, tokens: &[Token]) -> Result<String, String> {
        let mut value = None;
        for command in split_pipeline(tokens)? {
            value = Some(self.command(command, value)?);
        }
        value.ok_or_else(|| "missing value".to_string())
    }

    fn command(&self, tokens: &[Token], piped: Option<String>) -> Result<String, String> {
        let operands = split_operands(tokens)?;
        let (head, args) = operands
            .split_first()
            .ok_or_else(|| "empty command".to_string())?;

        match head {
            [Token::Ident(name)] if !is_literal(name) => {
                let mut values = args
                    .iter()
                    .map(|arg| self.operand(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                values.extend(piped);
                call(name, values)
            }
            _ => {
                if !args.is_empty() || piped.is_some() {
                    return Err("can't give argument to non-function".to_string());
                }
                self.operand(head)
            }
        }
    }

    fn operand(&self, tokens: &[Token]) -> Result<String, String> {
        match tokens {
            // call results are already parenthesized
            [Token::LParen, inner @ .., Token::RParen] => self.pipeline(inner),
            [Token::Field(path)] => match (self.dot(), path.is_empty()) {
                (Some(dot), true) => Ok(dot),
                (Some(dot), false) => Ok(format!("{}.{}", dot, path.join("."))),
                (None, true) => {
                    Err("`.` on its own is only supported inside range or with".to_string())
                }
                (None, false) => Ok(path.join(".")),
            },
            [Token::Var(name, path)] => match (name.is_empty(), path.is_empty()) {
                (true, true) => Err("`$` on its own is not supported".to_string()),
                (true, false) => Ok(path.join(".")),
                (false, true) => Ok(name.clone()),
                (false, false) => Ok(format!("{}.{}", name, path.join("."))),
            },
            [Token::Str(s)] | [Token::Number(s)] => Ok(s.clone()),
            [Token::Ident(word)] => match word.as_str() {
                "true" | "false" => Ok(word.clone()),
                "nil" => Ok("none".to_string()),
                other => Err(format!("function {} must start a command", other)),
            },
            _ => Err("unexpected token".to_string()),
        }
    }
}

/// Translate a Go function call; anything that is not a Go builtin is
/// treated as a filter applied to its last argument.
fn call(name: &str, args: Vec<String>) -> Result<String, String> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(format!("{} expects {} argument(s), got {}", name, n, args.len()))
        }
    };

    match name {
        "index" => {
            let (target, keys) = args
                .split_first()
                .ok_or_else(|| "index needs a value to index".to_string())?;
            Ok(keys
                .iter()
                .fold(target.clone(), |acc, key| format!("{}[{}]", acc, key)))
        }
        "len" => {
            arity(1)?;
            Ok(format!("({}|length)", args[0]))
        }
        "not" => {
            arity(1)?;
            Ok(format!("(not {})", args[0]))
        }
        "print" => {
            arity(1)?;
            Ok(args[0].clone())
        }
        "and" | "or" => {
            if args.is_empty() {
                return Err(format!("{} needs at least one argument", name));
            }
            Ok(format!("({})", args.join(&format!(" {} ", name))))
        }
        "eq" => {
            let (first, others) = args
                .split_first()
                .filter(|(_, others)| !others.is_empty())
                .ok_or_else(|| "eq needs at least two arguments".to_string())?;
            let alternatives: Vec<String> = others
                .iter()
                .map(|other| format!("{} == {}", first, other))
                .collect();
            Ok(format!("({})", alternatives.join(" or ")))
        }
        "ne" | "lt" | "le" | "gt" | "ge" => {
            arity(2)?;
            let op = match name {
                "ne" => "!=",
                "lt" => "<",
                "le" => "<=",
                "gt" => ">",
                _ => ">=",
            };
            Ok(format!("({} {} {})", args[0], op, args[1]))
        }
        "printf" | "println" | "html" | "js" | "urlquery" | "slice" | "call" => {
            Err(format!("function {} is not supported", name))
        }
        filter => {
            let (subject, filter_args) = args
                .split_last()
                .ok_or_else(|| format!("{} needs an argument", filter))?;
            if filter_args.is_empty() {
                Ok(format!("({}|{})", subject, filter))
            } else {
                Ok(format!("({}|{}({}))", subject, filter, filter_args.join(", ")))
            }
        }
    }
}

/// Whether an action reads as Go rather than as a minijinja expression
fn looks_like_go(tokens: &[Token]) -> bool {
    match tokens.first() {
        Some(Token::Field(_) | Token::Var(..)) => true,
        Some(Token::Ident(word)) => {
            FUNCTIONS.contains(&word.as_str())
                || tokens[1..]
                    .iter()
                    .any(|t| matches!(t, Token::Field(_) | Token::Var(..)))
        }
        Some(Token::LParen) => tokens
            .iter()
            .any(|t| matches!(t, Token::Field(_) | Token::Var(..))),
        _ => false,
    }
}

fn is_literal(word: &str) -> bool {
    matches!(word, "true" | "false" | "nil")
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while let Some(&c) = chars.get(i) {
        match c {
            _ if c.is_whitespace() => i += 1,
            '|' | '(' | ',' | '=' => {
                tokens.push(match c {
                    '|' => Token::Pipe,
                    '(' => Token::LParen,
                    ',' => Token::Comma,
                    _ => Token::Assign,
                });
                i += 1;
            }
            ')' => {
                if chars.get(i + 1) == Some(&'.') {
                    return Err("field access on a parenthesized value".to_string());
                }
                tokens.push(Token::RParen);
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Declare);
                i += 2;
            }
            '"' => {
                let end = closing_quote(&chars, i)?;
                tokens.push(Token::Str(chars[i..=end].iter().collect()));
                i = end + 1;
            }
            '`' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == '`')
                    .map(|p| i + 1 + p)
                    .ok_or_else(|| "unterminated raw string".to_string())?;
                let raw: String = chars[i + 1..end].iter().collect();
                tokens.push(Token::Str(quote(&raw)));
                i = end + 1;
            }
            '.' => {
                let (path, next) = read_path(&chars, i)?;
                tokens.push(Token::Field(path));
                i = next;
            }
            '$' => {
                let (name, after) = read_ident(&chars, i + 1);
                let (path, next) = if chars.get(after) == Some(&'.') {
                    read_path(&chars, after)?
                } else {
                    (Vec::new(), after)
                };
                tokens.push(Token::Var(name, path));
                i = next;
            }
            _ if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while chars
                    .get(i)
                    .is_some_and(|d| d.is_ascii_alphanumeric() || matches!(d, '.' | '_'))
                {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            _ if is_ident_start(c) => {
                let (word, next) = read_ident(&chars, i);
                if matches!(chars.get(next), Some('.' | '[')) {
                    return Err(format!("{} is followed by an accessor", word));
                }
                tokens.push(Token::Ident(word));
                i = next;
            }
            _ => return Err(format!("unexpected {:?}", c)),
        }
    }

    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn read_ident(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while chars
        .get(end)
        .is_some_and(|c| c.is_alphanumeric() || *c == '_')
    {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

/// Read `.A.B` starting at the dot at `start`
fn read_path(chars: &[char], start: usize) -> Result<(Vec<String>, usize), String> {
    let mut path = Vec::new();
    let mut i = start;
    while chars.get(i) == Some(&'.') {
        let (segment, next) = read_ident(chars, i + 1);
        if segment.is_empty() {
            if path.is_empty() {
                i += 1;
                break;
            }
            return Err("field name missing after `.`".to_string());
        }
        path.push(segment);
        i = next;
    }
    if matches!(chars.get(i), Some('[' | '.')) {
        return Err("subscript after a field reference".to_string());
    }
    Ok((path, i))
}

fn closing_quote(chars: &[char], start: usize) -> Result<usize, String> {
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return Err("unterminated string".to_string()),
            Some('\\') => i += 2,
            Some('"') => return Ok(i),
            Some(_) => i += 1,
        }
    }
}

fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Split on top-level `|`
fn split_pipeline(tokens: &[Token]) -> Result<Vec<&[Token]>, String> {
    let mut commands = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "unbalanced `)`".to_string())?;
            }
            Token::Pipe if depth == 0 => {
                commands.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unbalanced `(`".to_string());
    }
    commands.push(&tokens[start..]);
    if commands.iter().any(|c| c.is_empty()) {
        return Err("missing value in pipeline".to_string());
    }
    Ok(commands)
}

/// Split a command into operands; a parenthesized group is one operand
fn split_operands(tokens: &[Token]) -> Result<Vec<&[Token]>, String> {
    let mut operands = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i] == Token::LParen {
            let mut depth = 0usize;
            let mut end = None;
            for (j, token) in tokens.iter().enumerate().skip(i) {
                match token {
                    Token::LParen => depth += 1,
                    Token::RParen => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(j);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            let end = end.ok_or_else(|| "unbalanced `(`".to_string())?;
            operands.push(&tokens[i..=end]);
            i = end + 1;
        } else {
            operands.push(&tokens[i..=i]);
            i += 1;
        }
    }
    Ok(operands)
}

/// Split `$a, $b := pipeline` into variable names and the pipeline
fn split_declaration(tokens: &[Token]) -> Result<(Vec<String>, &[Token]), String> {
    let Some(pos) = tokens.iter().position(|t| *t == Token::Declare) else {
        return Ok((Vec::new(), tokens));
    };
    let mut names = Vec::new();
    for (i, token) in tokens[..pos].iter().enumerate() {
        match token {
            Token::Var(name, path) if i % 2 == 0 && !name.is_empty() && path.is_empty() => {
                names.push(name.clone())
            }
            Token::Comma if i % 2 == 1 => {}
            _ => return Err("malformed variable declaration".to_string()),
        }
    }
    if names.is_empty() {
        return Err("malformed variable declaration".to_string());
    }
    Ok((names, &tokens[pos + 1..]))
}

fn find_tag_open(s: &str) -> Option<usize> {
    ["{{", "{%", "{#"].iter().filter_map(|open| s.find(open)).min()
}

/// Separate `{{-` / `-}}` trim markers from an action body
fn split_trim(body: &str) -> (bool, &str, bool) {
    let (left, body) = match body.strip_prefix('-') {
        Some(rest) if rest.starts_with(char::is_whitespace) => (true, rest),
        _ => (false, body),
    };
    let (right, body) = match body.strip_suffix('-') {
        Some(rest) if rest.ends_with(char::is_whitespace) => (true, rest),
        _ => (false, body),
    };
    (left, body, right)
}

fn dash(trim: bool) -> &'static str {
    if trim {
        "-"
    } else {
        ""
    }
}

fn statement(trim_left: bool, body: &str, trim_right: bool) -> String {
    format!("{{%{} {} {}%}}", dash(trim_left), body, dash(trim_right))
}

fn expression(trim_left: bool, body: &str, trim_right: bool) -> String {
    format!("{{{{{} {} {}}}}}", dash(trim_left), body, dash(trim_right))
}

/// Drop a `.` that starts a field reference, skipping quoted strings.
fn strip_leading_dots(expr: &str) -> String {
    let mut result = String::with_capacity(expr.len());
    let mut chars = expr.chars().peekable();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    while let Some(ch) = chars.next() {
        match ch {
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                result.push(ch);
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                result.push(ch);
            }
            '.' if !in_single_quote && !in_double_quote => {
                let prev_starts_ref = result.chars().last().map_or(true, |c| {
                    c.is_whitespace() || matches!(c, '(' | ',' | '|' | '-' | '[')
                });
                let next_is_ident = chars
                    .peek()
                    .is_some_and(|c| c.is_alphabetic() || *c == '_');
                if !(prev_starts_ref && next_is_ident) {
                    result.push('.');
                }
            }
            _ => result.push(ch),
        }
    }

    result
}
