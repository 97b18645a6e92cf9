//! Structural symbol extraction.
//!
//! Walks the [`Lexer`] token stream with a small state machine and builds the
//! document outline:
//!
//! - `on <event> ...` handlers become [`SymbolKind::Event`]
//! - `<type> <name>(...)` (and `testcase`/`testfunction`/`export`) become
//!   [`SymbolKind::Function`]
//! - `<type> <name> [= ...];` become [`SymbolKind::Variable`]
//! - `variables {}`, `includes {}`, `struct X {}` and `enum X {}` become
//!   [`SymbolKind::Namespace`] containers
//!
//! Extraction is total: malformed declarations are downgraded to
//! best-effort symbols, unclosed bodies end at end of document, and every
//! token is handled a bounded number of times so the work stays linear.

use crate::document::DocumentVersion;
use crate::lexer::{Keyword, Lexer, Token, TokenKind};
use tower_lsp_server::ls_types::{Position, Range};

/// Name used when a declaration has no recognizable identifier.
pub const UNNAMED: &str = "<unnamed>";

/// Deepest symbol nesting the extractor builds. Bodies opened below this
/// depth are still tracked for brace matching but report no symbol.
pub const MAX_NESTING: usize = 256;

/// Longest [`Symbol::detail`] in bytes; longer text is cut and ends in `...`.
pub const MAX_DETAIL_LEN: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Function,
    Event,
    Variable,
    Namespace,
}

/// One outline entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub detail: Option<String>,
    pub kind: SymbolKind,
    /// Full declaration span.
    pub range: Range,
    /// Span of the name (or of the introducing keyword when unnamed).
    pub selection_range: Range,
    pub children: Vec<Symbol>,
}

/// Outline of a document together with the version that was scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedSymbols {
    pub version: DocumentVersion,
    pub symbols: Vec<Symbol>,
}

/// Knobs for [`extract_symbols`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Report variable declarations inside function and handler bodies.
    pub include_locals: bool,
    /// Fill [`Symbol::detail`] (event arguments, signatures, types).
    pub include_details: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            include_locals: false,
            include_details: true,
        }
    }
}

/// Extracts the symbol tree of `text`.
///
/// Never fails: empty, garbage or unbalanced input yields a (possibly empty
/// or partial) outline.
///
/// # Examples
///
/// ```
/// use capl_core::{ExtractOptions, SymbolKind, extract_symbols};
///
/// let symbols = extract_symbols("on start\n{\n}\non stop\n{\n}\n", &ExtractOptions::default());
///
/// let names: Vec<_> = symbols.iter().map(|s| s.name.as_str()).collect();
/// assert_eq!(names, ["start", "stop"]);
/// assert!(symbols.iter().all(|s| s.kind == SymbolKind::Event));
/// ```
pub fn extract_symbols(text: &str, options: &ExtractOptions) -> Vec<Symbol> {
    Extractor::new(text, *options).run()
}

/// Which declarations a scope reports directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    TopLevel,
    /// `variables`, `includes`, struct and enum bodies.
    Block,
    /// Function, handler and anonymous statement blocks.
    Code,
}

#[derive(Debug)]
struct Builder {
    name: String,
    detail: Option<String>,
    kind: SymbolKind,
    start: Position,
    selection: Range,
    children: Vec<Symbol>,
}

impl Builder {
    fn new(kind: SymbolKind, start: Position, name: Option<&Token<'_>>, fallback: Range) -> Self {
        let (name, selection) = match name {
            Some(token) => (token.text.to_string(), token.range()),
            None => (UNNAMED.to_string(), fallback),
        };
        Self {
            name,
            detail: None,
            kind,
            start,
            selection,
            children: Vec::new(),
        }
    }

    fn body_scope(&self) -> Scope {
        match self.kind {
            SymbolKind::Namespace => Scope::Block,
            _ => Scope::Code,
        }
    }
}

/// An open `{ ... }`.
#[derive(Debug)]
struct Frame {
    symbol: Option<Builder>,
    scope: Scope,
    /// Index of the closest frame (this one included) that owns a symbol.
    owner: Option<usize>,
    /// Number of symbol-owning frames up to and including this one.
    nesting: usize,
}

#[derive(Debug)]
enum Header<'a> {
    /// After `on`: name, then free-form arguments until `{`.
    Event {
        keyword: Range,
        name: Option<Token<'a>>,
        rest: Option<usize>,
        last_end: Position,
        last_byte: usize,
    },
    /// Type words of a function or variable declaration.
    Declaration {
        start: Position,
        start_byte: usize,
        first: Range,
        words: u32,
        name: Option<Token<'a>>,
        marker: bool,
        aggregate: Option<&'static str>,
        last_end: Position,
    },
    /// Inside a function parameter list.
    Parameters {
        builder: Builder,
        start_byte: usize,
        parens: u32,
        last_end: Position,
        last_byte: usize,
    },
    /// A complete header waiting for `{` (or `;` for prototypes).
    AwaitBody { builder: Builder, last_end: Position },
    /// Variable declarators up to the closing `;`.
    Declarators(DeclaratorList),
}

/// Progress through `<type> a = 1, b[2], c;`.
#[derive(Debug)]
struct DeclaratorList {
    current: Option<Builder>,
    type_text: Option<String>,
    emit: bool,
    parens: u32,
    braces: u32,
    /// The previous top-level token closed a `(...)` group.
    after_group: bool,
    last_end: Position,
}

#[derive(Debug)]
enum State<'a> {
    TopLevel,
    InDeclarationHeader(Header<'a>),
    InBody,
}

/// What to do with the current token after a state step.
enum Step {
    Consumed,
    Reprocess,
}

struct Extractor<'a> {
    lexer: Lexer<'a>,
    src: &'a str,
    options: ExtractOptions,
    state: State<'a>,
    stack: Vec<Frame>,
    roots: Vec<Symbol>,
    /// Tokens handled so far, reprocessing included.
    steps: usize,
}

impl<'a> Extractor<'a> {
    fn new(src: &'a str, options: ExtractOptions) -> Self {
        Self {
            lexer: Lexer::new(src),
            src,
            options,
            state: State::TopLevel,
            stack: Vec::new(),
            roots: Vec::new(),
            steps: 0,
        }
    }

    fn run(&mut self) -> Vec<Symbol> {
        let mut pending: Option<Token<'a>> = None;

        loop {
            let Some(token) = pending.take().or_else(|| self.lexer.next()) else {
                break;
            };

            self.steps += 1;
            let state = std::mem::replace(&mut self.state, State::TopLevel);
            let step = match state {
                State::TopLevel | State::InBody => self.scan(&token),
                State::InDeclarationHeader(header) => self.header(header, &token),
            };

            if let Step::Reprocess = step {
                pending = Some(token);
            }
        }

        self.finish_at_eof();
        tracing::trace!(steps = self.steps, "extracted {} top-level symbols", self.roots.len());
        std::mem::take(&mut self.roots)
    }

    fn scope(&self) -> Scope {
        self.stack.last().map_or(Scope::TopLevel, |frame| frame.scope)
    }

    fn scanning_state(&self) -> State<'a> {
        if self.stack.is_empty() {
            State::TopLevel
        } else {
            State::InBody
        }
    }

    fn variables_allowed(&self) -> bool {
        match self.scope() {
            Scope::TopLevel | Scope::Block => true,
            Scope::Code => self.options.include_locals,
        }
    }

    /// `TopLevel` / `InBody`: look for declaration starts and braces.
    fn scan(&mut self, token: &Token<'a>) -> Step {
        self.state = self.scanning_state();

        match token.kind {
            TokenKind::Keyword(Keyword::On) => {
                self.state = State::InDeclarationHeader(Header::Event {
                    keyword: token.range(),
                    name: None,
                    rest: None,
                    last_end: token.end,
                    last_byte: token.span.end,
                });
            }
            TokenKind::Keyword(Keyword::Variables | Keyword::Includes) => {
                let builder =
                    Builder::new(SymbolKind::Namespace, token.start, Some(token), token.range());
                self.state = State::InDeclarationHeader(Header::AwaitBody {
                    builder,
                    last_end: token.end,
                });
            }
            TokenKind::Keyword(
                keyword @ (Keyword::Type | Keyword::FunctionMarker | Keyword::Struct | Keyword::Enum),
            ) => {
                let aggregate = match keyword {
                    Keyword::Struct => Some("struct"),
                    Keyword::Enum => Some("enum"),
                    _ => None,
                };
                self.state = State::InDeclarationHeader(Header::Declaration {
                    start: token.start,
                    start_byte: token.span.start,
                    first: token.range(),
                    words: 1,
                    name: None,
                    marker: keyword == Keyword::FunctionMarker,
                    aggregate,
                    last_end: token.end,
                });
            }
            TokenKind::OpenBrace => {
                let scope = match self.scope() {
                    Scope::TopLevel => Scope::Code,
                    scope => scope,
                };
                self.push_frame(None, scope);
                self.state = State::InBody;
            }
            TokenKind::CloseBrace => self.pop_frame(token.end),
            _ => {}
        }

        Step::Consumed
    }

    fn header(&mut self, header: Header<'a>, token: &Token<'a>) -> Step {
        match header {
            Header::Event {
                keyword,
                name,
                rest,
                last_end,
                last_byte,
            } => self.event_header(keyword, name, rest, last_end, last_byte, token),
            Header::Declaration {
                start,
                start_byte,
                first,
                mut words,
                mut name,
                marker,
                aggregate,
                last_end,
            } => {
                match token.kind {
                    TokenKind::Keyword(Keyword::On | Keyword::Variables | Keyword::Includes)
                    | TokenKind::CloseBrace
                        if words >= 2 && !marker =>
                    {
                        tracing::trace!("declaration missing ';' before {:?}", token.text);
                        return self.begin_declarators(start, start_byte, first, name, last_end);
                    }
                    TokenKind::Keyword(
                        Keyword::Type | Keyword::FunctionMarker | Keyword::Struct | Keyword::Enum,
                    ) if words >= 2 && !marker && token.start.line > last_end.line => {
                        tracing::trace!("declaration missing ';' before {:?}", token.text);
                        return self.begin_declarators(start, start_byte, first, name, last_end);
                    }
                    TokenKind::Keyword(Keyword::On | Keyword::Variables | Keyword::Includes) => {
                        tracing::trace!("declaration interrupted at {:?}", token.start);
                        return self.abandon();
                    }
                    _ if token.is_word() => {
                        words += 1;
                        name = Some(token.clone());
                    }
                    TokenKind::Number => {}
                    TokenKind::Punct if matches!(token.text, "." | "::" | "*") => {}
                    TokenKind::OpenParen if words >= 2 => {
                        let builder = Builder::new(
                            SymbolKind::Function,
                            start,
                            name.as_ref(),
                            first,
                        );
                        self.state = State::InDeclarationHeader(Header::Parameters {
                            builder,
                            start_byte,
                            parens: 1,
                            last_end: token.end,
                            last_byte: token.span.end,
                        });
                        return Step::Consumed;
                    }
                    TokenKind::Assign
                    | TokenKind::Semicolon
                    | TokenKind::OpenBracket
                    | TokenKind::Comma
                        if words >= 2 && !marker =>
                    {
                        return self.begin_declarators(start, start_byte, first, name, last_end);
                    }
                    TokenKind::OpenBrace if aggregate.is_some() => {
                        let name_token = if words >= 2 {
                            name.as_ref()
                        } else {
                            None
                        };
                        let mut builder =
                            Builder::new(SymbolKind::Namespace, start, name_token, first);
                        builder.detail = aggregate.map(str::to_string);
                        let scope = builder.body_scope();
                        self.push_frame(Some(builder), scope);
                        self.state = State::InBody;
                        return Step::Consumed;
                    }
                    _ => {
                        tracing::trace!("not a declaration: {:?} at {:?}", token.text, token.start);
                        return self.abandon();
                    }
                }

                self.state = State::InDeclarationHeader(Header::Declaration {
                    start,
                    start_byte,
                    first,
                    words,
                    name,
                    marker,
                    aggregate,
                    last_end: token.end,
                });
                Step::Consumed
            }
            Header::Parameters {
                mut builder,
                start_byte,
                mut parens,
                last_end,
                last_byte,
            } => match token.kind {
                TokenKind::OpenParen => {
                    parens += 1;
                    self.state = State::InDeclarationHeader(Header::Parameters {
                        builder,
                        start_byte,
                        parens,
                        last_end: token.end,
                        last_byte: token.span.end,
                    });
                    Step::Consumed
                }
                TokenKind::CloseParen if parens <= 1 => {
                    builder.detail = Some(collapse_whitespace(
                        &self.src[start_byte..token.span.end],
                    ));
                    self.state = State::InDeclarationHeader(Header::AwaitBody {
                        builder,
                        last_end: token.end,
                    });
                    Step::Consumed
                }
                TokenKind::OpenBrace
                | TokenKind::CloseBrace
                | TokenKind::Semicolon
                | TokenKind::Keyword(Keyword::On) => {
                    tracing::trace!("unterminated parameter list for {}", builder.name);
                    builder.detail = Some(collapse_whitespace(&self.src[start_byte..last_byte]));
                    self.state =
                        State::InDeclarationHeader(Header::AwaitBody { builder, last_end });
                    Step::Reprocess
                }
                _ => {
                    if token.kind == TokenKind::CloseParen {
                        parens -= 1;
                    }
                    self.state = State::InDeclarationHeader(Header::Parameters {
                        builder,
                        start_byte,
                        parens,
                        last_end: token.end,
                        last_byte: token.span.end,
                    });
                    Step::Consumed
                }
            },
            Header::AwaitBody { builder, last_end } => match token.kind {
                TokenKind::OpenBrace => {
                    let scope = builder.body_scope();
                    self.push_frame(Some(builder), scope);
                    self.state = State::InBody;
                    Step::Consumed
                }
                TokenKind::Semicolon => {
                    self.state = self.scanning_state();
                    self.close(builder, token.end);
                    Step::Consumed
                }
                _ => {
                    tracing::trace!("{} has no body", builder.name);
                    self.state = self.scanning_state();
                    self.close(builder, last_end);
                    Step::Reprocess
                }
            },
            Header::Declarators(list) => self.declarators(list, token),
        }
    }

    fn event_header(
        &mut self,
        keyword: Range,
        mut name: Option<Token<'a>>,
        mut rest: Option<usize>,
        last_end: Position,
        last_byte: usize,
        token: &Token<'a>,
    ) -> Step {
        match token.kind {
            TokenKind::OpenBrace => {
                let builder = self.event_builder(keyword, name.as_ref(), rest, last_byte);
                self.push_frame(Some(builder), Scope::Code);
                self.state = State::InBody;
                return Step::Consumed;
            }
            TokenKind::Semicolon => {
                let builder = self.event_builder(keyword, name.as_ref(), rest, last_byte);
                self.state = self.scanning_state();
                self.close(builder, token.end);
                return Step::Consumed;
            }
            TokenKind::CloseBrace
            | TokenKind::Keyword(Keyword::On | Keyword::Variables | Keyword::Includes) => {
                let builder = self.event_builder(keyword, name.as_ref(), rest, last_byte);
                self.state = self.scanning_state();
                self.close(builder, last_end);
                return Step::Reprocess;
            }
            _ if token.start.line != keyword.start.line => {
                tracing::trace!("event handler without body at {:?}", keyword.start);
                let builder = self.event_builder(keyword, name.as_ref(), rest, last_byte);
                self.state = self.scanning_state();
                self.close(builder, last_end);
                return Step::Reprocess;
            }
            _ if name.is_none()
                && rest.is_none()
                && (token.is_word() || token.text == "*") =>
            {
                name = Some(token.clone());
            }
            _ => {
                rest.get_or_insert(token.span.start);
            }
        }

        self.state = State::InDeclarationHeader(Header::Event {
            keyword,
            name,
            rest,
            last_end: token.end,
            last_byte: token.span.end,
        });
        Step::Consumed
    }

    /// Builds an event symbol from its collected header.
    fn event_builder(
        &self,
        keyword: Range,
        name: Option<&Token<'a>>,
        rest: Option<usize>,
        last_byte: usize,
    ) -> Builder {
        let mut builder = Builder::new(SymbolKind::Event, keyword.start, name, keyword);
        builder.detail = rest
            .map(|from| collapse_whitespace(&self.src[from..last_byte]))
            .filter(|detail| !detail.is_empty());
        builder
    }

    fn declarators(&mut self, mut list: DeclaratorList, token: &Token<'a>) -> Step {
        let top = list.parens == 0 && list.braces == 0;

        match token.kind {
            TokenKind::Semicolon => {
                self.state = self.scanning_state();
                self.emit_declarator(list.current, &list.type_text, list.emit, token.end);
                return Step::Consumed;
            }
            TokenKind::CloseBrace if list.braces == 0 => {
                tracing::trace!("declaration missing ';' before '}}'");
                return self.end_declarators(list);
            }
            TokenKind::Keyword(Keyword::On | Keyword::Variables | Keyword::Includes) => {
                tracing::trace!("declaration missing ';' before {:?}", token.text);
                return self.end_declarators(list);
            }
            TokenKind::Keyword(
                Keyword::Type | Keyword::FunctionMarker | Keyword::Struct | Keyword::Enum,
            ) if top && token.start.line > list.last_end.line => {
                tracing::trace!("declaration missing ';' before {:?}", token.text);
                return self.end_declarators(list);
            }
            TokenKind::OpenBrace if top && list.after_group => {
                tracing::trace!("declaration missing ';' before a body at {:?}", token.start);
                return self.end_declarators(list);
            }
            TokenKind::Comma if top => {
                let current = list.current.take();
                self.emit_declarator(current, &list.type_text, list.emit, list.last_end);
            }
            _ if top && list.current.is_none() && token.is_word() => {
                list.current = Some(Builder::new(
                    SymbolKind::Variable,
                    token.start,
                    Some(token),
                    token.range(),
                ));
            }
            TokenKind::OpenParen | TokenKind::OpenBracket => list.parens += 1,
            TokenKind::CloseParen | TokenKind::CloseBracket => {
                list.parens = list.parens.saturating_sub(1);
            }
            TokenKind::OpenBrace => list.braces += 1,
            TokenKind::CloseBrace => list.braces -= 1,
            _ => {}
        }

        list.after_group = token.kind == TokenKind::CloseParen
            && list.parens == 0
            && list.braces == 0;
        list.last_end = token.end;
        self.state = State::InDeclarationHeader(Header::Declarators(list));
        Step::Consumed
    }

    /// Switches a `<type> <name>` header to its declarator list; the current
    /// token is reprocessed there.
    fn begin_declarators(
        &mut self,
        start: Position,
        start_byte: usize,
        first: Range,
        name: Option<Token<'a>>,
        last_end: Position,
    ) -> Step {
        let type_text = name
            .as_ref()
            .map(|t| collapse_whitespace(&self.src[start_byte..t.span.start]));
        let builder = Builder::new(SymbolKind::Variable, start, name.as_ref(), first);
        self.state = State::InDeclarationHeader(Header::Declarators(DeclaratorList {
            current: Some(builder),
            type_text,
            emit: self.variables_allowed(),
            parens: 0,
            braces: 0,
            after_group: false,
            last_end,
        }));
        Step::Reprocess
    }

    /// Closes an unterminated declaration before `token`, which is reprocessed.
    fn end_declarators(&mut self, list: DeclaratorList) -> Step {
        self.state = self.scanning_state();
        self.emit_declarator(list.current, &list.type_text, list.emit, list.last_end);
        Step::Reprocess
    }

    fn emit_declarator(
        &mut self,
        current: Option<Builder>,
        type_text: &Option<String>,
        emit: bool,
        end: Position,
    ) {
        if let Some(mut builder) = current
            && emit
        {
            builder.detail.clone_from(type_text);
            self.close(builder, end);
        }
    }

    /// Drops a header that turned out not to be a declaration.
    fn abandon(&mut self) -> Step {
        self.state = self.scanning_state();
        Step::Reprocess
    }

    fn push_frame(&mut self, mut symbol: Option<Builder>, scope: Scope) {
        let (parent_owner, parent_nesting) = self
            .stack
            .last()
            .map_or((None, 0), |frame| (frame.owner, frame.nesting));

        if parent_nesting >= MAX_NESTING
            && let Some(builder) = symbol.take()
        {
            tracing::trace!("dropping {} nested below {MAX_NESTING} levels", builder.name);
        }

        let (owner, nesting) = if symbol.is_some() {
            (Some(self.stack.len()), parent_nesting + 1)
        } else {
            (parent_owner, parent_nesting)
        };
        self.stack.push(Frame {
            symbol,
            scope,
            owner,
            nesting,
        });
    }

    fn pop_frame(&mut self, end: Position) {
        match self.stack.pop() {
            Some(Frame {
                symbol: Some(builder),
                ..
            }) => self.close(builder, end),
            Some(_) => {}
            None => tracing::trace!("unbalanced '}}' at {:?}", end),
        }
        self.state = self.scanning_state();
    }

    /// Finishes a symbol and attaches it to the innermost open symbol.
    fn close(&mut self, builder: Builder, end: Position) {
        let symbol = Symbol {
            name: builder.name,
            detail: builder.detail.filter(|_| self.options.include_details),
            kind: builder.kind,
            range: Range::new(builder.start, end),
            selection_range: builder.selection,
            children: builder.children,
        };

        let owner = self.stack.last().and_then(|frame| frame.owner);
        match owner.and_then(|i| self.stack[i].symbol.as_mut()) {
            Some(parent) => parent.children.push(symbol),
            None => self.roots.push(symbol),
        }
    }

    /// Closes everything still open at end of input.
    fn finish_at_eof(&mut self) {
        let state = std::mem::replace(&mut self.state, State::TopLevel);
        if let State::InDeclarationHeader(header) = state {
            self.finish_header_at_eof(header);
        }

        let end = self.lexer.current_position();
        while !self.stack.is_empty() {
            self.pop_frame(end);
        }
    }

    fn finish_header_at_eof(&mut self, header: Header<'a>) {
        match header {
            Header::Event {
                keyword,
                name,
                rest,
                last_end,
                last_byte,
            } => {
                let builder = self.event_builder(keyword, name.as_ref(), rest, last_byte);
                self.close(builder, last_end);
            }
            Header::Declaration {
                start,
                first,
                words,
                name,
                marker,
                last_end,
                ..
            } if words >= 2 => {
                let kind = if marker {
                    SymbolKind::Function
                } else {
                    SymbolKind::Variable
                };
                if kind == SymbolKind::Function || self.variables_allowed() {
                    let builder = Builder::new(kind, start, name.as_ref(), first);
                    self.close(builder, last_end);
                }
            }
            Header::Declaration { .. } => {}
            Header::Parameters {
                mut builder,
                start_byte,
                last_end,
                last_byte,
                ..
            } => {
                builder.detail = Some(collapse_whitespace(&self.src[start_byte..last_byte]));
                self.close(builder, last_end);
            }
            Header::AwaitBody { builder, last_end } => self.close(builder, last_end),
            Header::Declarators(list) => {
                self.emit_declarator(list.current, &list.type_text, list.emit, list.last_end);
            }
        }
    }
}

/// Joins the words of `text` with single spaces, cut at [`MAX_DETAIL_LEN`].
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::new();
    for word in text.split_whitespace() {
        if !out.is_empty() {
            if out.len() >= MAX_DETAIL_LEN {
                out.push_str("...");
                break;
            }
            out.push(' ');
        }
        let room = MAX_DETAIL_LEN.saturating_sub(out.len());
        if word.len() > room {
            out.push_str(&word[..floor_char_boundary(word, room)]);
            out.push_str("...");
            break;
        }
        out.push_str(word);
    }
    out
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    (0..=index)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0)
}
