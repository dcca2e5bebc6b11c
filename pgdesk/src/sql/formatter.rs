//! SQL beautifier and statement classification

use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    /// String literal, quoted identifier or dollar-quoted body, kept verbatim
    Quoted(String),
    Number(String),
    Parameter(String),
    Symbol(String),
    LineComment(String),
    BlockComment(String),
}

const KEYWORDS: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "BEGIN", "BETWEEN", "BY", "CASCADE", "CASE",
    "CAST", "CHECK", "COLUMN", "COMMENT", "COMMIT", "CONFLICT", "CONSTRAINT", "CREATE", "CROSS",
    "DEFAULT", "DELETE", "DESC", "DISTINCT", "DO", "DROP", "ELSE", "END", "EXCEPT", "EXISTS",
    "EXPLAIN", "FALSE", "FETCH", "FIRST", "FOR", "FOREIGN", "FROM", "FULL", "GRANT", "GROUP",
    "HAVING", "ILIKE", "IN", "INDEX", "INNER", "INSERT", "INTERSECT", "INTERVAL", "INTO", "IS",
    "JOIN", "KEY", "LAST", "LATERAL", "LEFT", "LIKE", "LIMIT", "NATURAL", "NOT", "NOTHING",
    "NULL", "NULLS", "OFFSET", "ON", "ONLY", "OR", "ORDER", "OUTER", "OVER", "PARTITION",
    "PRIMARY", "REFERENCES", "RETURNING", "REVOKE", "RIGHT", "ROLLBACK", "ROWS", "SCHEMA",
    "SELECT", "SET", "SHOW", "TABLE", "THEN", "TO", "TRUE", "TRUNCATE", "UNION", "UNIQUE",
    "UPDATE", "USING", "VALUES", "VIEW", "WHEN", "WHERE", "WINDOW", "WITH",
];

const CLAUSE_STARTS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "HAVING", "LIMIT", "OFFSET", "VALUES", "SET", "RETURNING",
    "UNION", "INTERSECT", "EXCEPT", "UPDATE", "INSERT", "DELETE", "WINDOW",
];

const JOIN_MODIFIERS: &[&str] = &["LEFT", "RIGHT", "INNER", "FULL", "CROSS", "NATURAL"];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word.to_ascii_uppercase().as_str())
}

fn is_operator_char(character: char) -> bool {
    "+-*/<>=!|&%^~#@".contains(character)
}

fn scan_while(characters: &[char], start: usize, predicate: fn(char) -> bool) -> usize {
    let mut end = start;
    while end < characters.len() && predicate(characters[end]) {
        end += 1;
    }
    end
}

fn tokenize(sql: &str) -> Vec<Token> {
    let characters: Vec<char> = sql.chars().collect();
    let length = characters.len();
    let mut tokens = Vec::new();
    let mut index = 0;

    let take_while = |start: usize, predicate: fn(char) -> bool| scan_while(&characters, start, predicate);
    let text = |start: usize, end: usize| characters[start..end].iter().collect::<String>();

    while index < length {
        let current = characters[index];
        let next = characters.get(index + 1).copied();

        if current.is_whitespace() {
            index += 1;
        } else if current == '-' && next == Some('-') {
            let end = take_while(index, |character| character != '\n');
            tokens.push(Token::LineComment(text(index, end).trim_end().to_string()));
            index = end;
        } else if current == '/' && next == Some('*') {
            let mut end = index + 2;
            while end < length && !(characters[end] == '*' && characters.get(end + 1) == Some(&'/')) {
                end += 1;
            }
            end = (end + 2).min(length);
            tokens.push(Token::BlockComment(text(index, end)));
            index = end;
        } else if current == '\''
            || (matches!(current, 'e' | 'E' | 'b' | 'B' | 'x' | 'X' | 'n' | 'N')
                && next == Some('\'')
                && !matches!(tokens.last(), Some(Token::Word(_))))
        {
            let quote_start = if current == '\'' { index } else { index + 1 };
            let mut end = quote_start + 1;
            while end < length {
                if characters[end] == '\'' {
                    if characters.get(end + 1) == Some(&'\'') {
                        end += 2;
                        continue;
                    }
                    end += 1;
                    break;
                }
                end += 1;
            }
            tokens.push(Token::Quoted(text(index, end.min(length))));
            index = end.min(length);
        } else if current == '"' {
            let mut end = index + 1;
            while end < length {
                if characters[end] == '"' {
                    if characters.get(end + 1) == Some(&'"') {
                        end += 2;
                        continue;
                    }
                    end += 1;
                    break;
                }
                end += 1;
            }
            tokens.push(Token::Quoted(text(index, end.min(length))));
            index = end.min(length);
        } else if current == '$' {
            let tag_end = take_while(index + 1, |character| {
                character.is_alphanumeric() || character == '_'
            });
            let tag_is_identifier = tag_end > index + 1
                && !characters[index + 1].is_ascii_digit();
            if characters.get(tag_end) == Some(&'$') && (tag_is_identifier || tag_end == index + 1) {
                let tag = text(index, tag_end + 1);
                let body_start = tag_end + 1;
                let body: String = text(body_start, length);
                let end = match body.find(&tag) {
                    Some(offset) => body_start + body[..offset].chars().count() + tag.chars().count(),
                    None => length,
                };
                tokens.push(Token::Quoted(text(index, end)));
                index = end;
            } else {
                let end = tag_end.max(index + 1);
                tokens.push(Token::Parameter(text(index, end)));
                index = end;
            }
        } else if current == ':' && next == Some(':') {
            tokens.push(Token::Symbol("::".to_string()));
            index += 2;
        } else if current == ':' && next.map(|c| c.is_alphabetic() || c == '_').unwrap_or(false) {
            let end = take_while(index + 1, |character| {
                character.is_alphanumeric() || character == '_'
            });
            tokens.push(Token::Parameter(text(index, end)));
            index = end;
        } else if current == '?' && !matches!(next, Some('|') | Some('&')) {
            tokens.push(Token::Parameter("?".to_string()));
            index += 1;
        } else if current.is_ascii_digit()
            || (current == '.' && next.map(|c| c.is_ascii_digit()).unwrap_or(false))
        {
            let end = take_while(index, |character| {
                character.is_ascii_alphanumeric() || character == '.'
            });
            tokens.push(Token::Number(text(index, end)));
            index = end;
        } else if current.is_alphabetic() || current == '_' {
            let end = take_while(index, |character| {
                character.is_alphanumeric() || character == '_' || character == '$'
            });
            tokens.push(Token::Word(text(index, end)));
            index = end;
        } else if is_operator_char(current) || current == '?' {
            let end = take_while(index + 1, |character| {
                is_operator_char(character) && character != '-'
            });
            tokens.push(Token::Symbol(text(index, end)));
            index = end;
        } else {
            tokens.push(Token::Symbol(current.to_string()));
            index += 1;
        }
    }

    tokens
}

fn upper_word(token: Option<&Token>) -> Option<String> {
    match token {
        Some(Token::Word(word)) => Some(word.to_ascii_uppercase()),
        _ => None,
    }
}

fn symbol_is(token: Option<&Token>, expected: &str) -> bool {
    matches!(token, Some(Token::Symbol(symbol)) if symbol == expected)
}

/// Beautify SQL: uppercase keywords, one major clause per line, indented AND/OR
///
/// String literals, quoted identifiers, dollar-quoted bodies and comments are
/// left untouched. Formatting already formatted SQL returns it unchanged.
pub fn format_sql(sql: &str) -> String {
    let tokens = tokenize(sql);
    let mut output = String::with_capacity(sql.len() + 16);
    let mut clauses: Vec<Option<String>> = vec![None];
    let mut between_pending = false;
    let mut force_newline = false;
    let mut unary_pending = false;

    for (index, token) in tokens.iter().enumerate() {
        let previous = if index > 0 { tokens.get(index - 1) } else { None };
        let previous_word = upper_word(previous);
        let depth = clauses.len() - 1;
        let upper = upper_word(Some(token));

        let mut newline = force_newline;
        let mut extra_indent = false;
        force_newline = false;

        if let Some(word) = upper.as_deref() {
            let follows = |expected: &[&str]| {
                previous_word
                    .as_deref()
                    .map(|previous| expected.contains(&previous))
                    .unwrap_or(false)
            };

            if CLAUSE_STARTS.contains(&word) {
                let inline = match word {
                    "FROM" => follows(&["DELETE", "DISTINCT"]),
                    "UPDATE" | "DELETE" => follows(&["ON", "DO", "FOR"]),
                    "SET" => follows(&["CHARACTER"]),
                    _ => false,
                };
                if !inline {
                    newline = true;
                    if let Some(top) = clauses.last_mut() {
                        *top = Some(word.to_string());
                    }
                }
            } else if (word == "GROUP" || word == "ORDER")
                && upper_word(tokens.get(index + 1)).as_deref() == Some("BY")
            {
                newline = true;
                if let Some(top) = clauses.last_mut() {
                    *top = Some(word.to_string());
                }
            } else if JOIN_MODIFIERS.contains(&word) {
                let mut lookahead = index + 1;
                while upper_word(tokens.get(lookahead)).as_deref() == Some("OUTER") {
                    lookahead += 1;
                }
                if upper_word(tokens.get(lookahead)).as_deref() == Some("JOIN") {
                    newline = true;
                }
            } else if word == "JOIN" && !follows(JOIN_MODIFIERS) && !follows(&["OUTER"]) {
                newline = true;
            } else if word == "ON" {
                if let Some(top) = clauses.last_mut() {
                    *top = Some("ON".to_string());
                }
            } else if word == "BETWEEN" {
                between_pending = true;
            } else if word == "AND" && between_pending {
                between_pending = false;
            } else if word == "AND" || word == "OR" {
                let in_condition = clauses
                    .last()
                    .and_then(|top| top.as_deref())
                    .map(|top| matches!(top, "WHERE" | "HAVING" | "ON"))
                    .unwrap_or(false);
                if in_condition {
                    newline = true;
                    extra_indent = true;
                }
            }
        }

        let rendered = match token {
            Token::Word(word) if is_keyword(word) => word.to_ascii_uppercase(),
            Token::Word(text)
            | Token::Quoted(text)
            | Token::Number(text)
            | Token::Parameter(text)
            | Token::Symbol(text)
            | Token::LineComment(text)
            | Token::BlockComment(text) => text.clone(),
        };

        if newline && !output.is_empty() {
            let trimmed = output.trim_end().len();
            output.truncate(trimmed);
            output.push('\n');
            output.push_str(&"  ".repeat(depth + usize::from(extra_indent)));
        } else if !output.is_empty() && !output.ends_with('\n') && !output.ends_with(' ') {
            let attach = match token {
                Token::Symbol(symbol) => matches!(symbol.as_str(), "," | ")" | "." | ";" | "::" | "[" | "]")
                    || (symbol == "(" && opens_call(&tokens, index)),
                _ => false,
            } || unary_pending
                || symbol_is(previous, "(")
                || symbol_is(previous, ".")
                || symbol_is(previous, "::")
                || symbol_is(previous, "[");
            if !attach {
                output.push(' ');
            }
        }

        unary_pending = matches!(token, Token::Symbol(symbol) if (symbol == "-" || symbol == "+")
            && match previous {
                None => true,
                Some(Token::Symbol(previous)) => previous != ")" && previous != "]",
                Some(Token::Word(word)) => is_keyword(word),
                _ => false,
            });

        output.push_str(&rendered);

        match token {
            Token::Symbol(symbol) if symbol == "(" => clauses.push(None),
            Token::Symbol(symbol) if symbol == ")" => {
                if clauses.len() > 1 {
                    clauses.pop();
                }
            }
            Token::Symbol(symbol) if symbol == ";" => {
                force_newline = true;
                clauses = vec![None];
                between_pending = false;
            }
            Token::LineComment(_) => force_newline = true,
            _ => {}
        }
    }

    output.trim_end().to_string()
}

/// Whether the `(` at `index` starts a function call or column list rather than a group
fn opens_call(tokens: &[Token], index: usize) -> bool {
    if index == 0 {
        return false;
    }
    match &tokens[index - 1] {
        Token::Word(word) if !is_keyword(word) => {
            let before = if index >= 2 { upper_word(tokens.get(index - 2)) } else { None };
            !matches!(before.as_deref(), Some("INTO") | Some("TABLE") | Some("UPDATE"))
        }
        Token::Quoted(text) => text.starts_with('"'),
        _ => false,
    }
}

/// Broad category of a SQL statement, from its leading keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Other,
}

impl StatementKind {
    /// Whether the statement changes table structure or catalog objects
    pub fn changes_schema(self) -> bool {
        self == StatementKind::Ddl
    }

    /// Whether the statement changes table contents
    pub fn changes_rows(self) -> bool {
        matches!(
            self,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        )
    }
}

fn words(sql: &str) -> impl Iterator<Item = String> {
    tokenize(sql).into_iter().filter_map(|token| match token {
        Token::Word(word) => Some(word.to_ascii_uppercase()),
        _ => None,
    })
}

/// Classify `sql` by its first keyword, skipping comments
///
/// A `WITH` query is classified by the first data-modifying keyword of its
/// body, if any.
pub fn statement_kind(sql: &str) -> StatementKind {
    let mut words = words(sql);
    let Some(first) = words.next() else {
        return StatementKind::Other;
    };

    match first.as_str() {
        "SELECT" | "VALUES" | "TABLE" | "SHOW" | "EXPLAIN" => StatementKind::Select,
        "WITH" => words
            .find_map(|word| match word.as_str() {
                "INSERT" => Some(StatementKind::Insert),
                "UPDATE" => Some(StatementKind::Update),
                "DELETE" => Some(StatementKind::Delete),
                _ => None,
            })
            .unwrap_or(StatementKind::Select),
        "INSERT" | "COPY" => StatementKind::Insert,
        "UPDATE" => StatementKind::Update,
        "DELETE" | "TRUNCATE" => StatementKind::Delete,
        "CREATE" | "ALTER" | "DROP" | "COMMENT" | "GRANT" | "REVOKE" | "REINDEX" => {
            StatementKind::Ddl
        }
        _ => StatementKind::Other,
    }
}

/// Whether executing `sql` produces a result set
pub fn returns_rows(sql: &str) -> bool {
    let kind = statement_kind(sql);
    kind == StatementKind::Select || (kind != StatementKind::Ddl && words(sql).any(|word| word == "RETURNING"))
}
