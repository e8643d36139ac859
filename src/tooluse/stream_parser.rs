//! Incremental tool-reply parser
//!
//! Single-pass state machine over the model's streamed reply. Memory is
//! bounded by key names and the `type`/`tool` values; content characters
//! are never buffered, they are emitted as events the moment they arrive.
//!
//! Two input grammars are recognized from the first non-whitespace
//! character: a JSON object (`{"type":"tool_call",...}` or
//! `{"type":"response",...}`), and a textual fallback for models that
//! ignore the JSON instruction and echo the history shim format
//! (`[Assistant called tools]:\n- NAME(JSON)`).

/// One parsed output fragment
#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    /// A character of `content` from a `response`-typed reply
    Content(String),
    /// A raw character of the serialized `arguments` object
    ToolCallInc { text: String, tool: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Init,
    // JSON grammar
    InObject,
    InKey,
    Colon,
    InValue,
    // Textual fallback grammar
    TextDetecting,
    TextFindingTool,
    TextReadingName,
    TextReadingArgs,
}

/// Streaming reply parser
#[derive(Debug)]
pub struct StreamParser {
    state: State,
    current_key: String,
    in_string: bool,
    escaped: bool,
    depth: i32,

    response_type: String,
    tool_name: String,
    saw_tool_call: bool,

    buffer: String,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamParser {
    pub fn new() -> Self {
        Self {
            state: State::Init,
            current_key: String::new(),
            in_string: false,
            escaped: false,
            depth: 0,
            response_type: String::new(),
            tool_name: String::new(),
            saw_tool_call: false,
            buffer: String::new(),
        }
    }

    /// `type` value seen so far ("tool_call", "response", or empty)
    pub fn response_type(&self) -> &str {
        &self.response_type
    }

    /// True once any tool-call fragment has been emitted
    pub fn saw_tool_call(&self) -> bool {
        self.saw_tool_call
    }

    /// Feed a chunk of model output, collecting whatever events it closes.
    pub fn process(&mut self, chunk: &str) -> Vec<ParseEvent> {
        let mut events = Vec::new();
        for ch in chunk.chars() {
            self.step(ch, &mut events);
        }
        events
    }

    fn step(&mut self, ch: char, events: &mut Vec<ParseEvent>) {
        if self.state == State::Init {
            if ch.is_whitespace() {
                return;
            }
            if ch == '{' {
                self.state = State::InObject;
                self.depth = 1;
            } else {
                self.state = State::TextDetecting;
            }
            return;
        }

        if matches!(
            self.state,
            State::TextDetecting
                | State::TextFindingTool
                | State::TextReadingName
                | State::TextReadingArgs
        ) {
            self.step_text(ch, events);
            return;
        }

        let prev_depth = self.depth;

        if self.in_string {
            self.step_in_string(ch, events);
        } else {
            match ch {
                '{' => {
                    self.depth += 1;
                    if self.depth == 1 {
                        self.state = State::InObject;
                    }
                }
                '}' => {
                    self.depth -= 1;
                    if self.depth == 1 {
                        self.state = State::InObject;
                    }
                }
                '"' => {
                    self.in_string = true;
                    if self.state == State::InObject {
                        self.state = State::InKey;
                    }
                }
                ':' => {
                    if self.state == State::Colon {
                        self.state = State::InValue;
                    }
                }
                ',' => {
                    if self.state == State::InValue && self.depth == 1 {
                        self.state = State::InObject;
                        self.current_key.clear();
                    }
                }
                _ => {}
            }
        }

        // Arguments stream raw so the client sees incrementally valid
        // JSON: everything strictly inside the arguments object, plus the
        // brace that closes it.
        if self.response_type == "tool_call" && !self.tool_name.is_empty() {
            let inside = self.depth > 1;
            let closing = self.depth == 1 && prev_depth == 2;
            if inside || closing {
                self.saw_tool_call = true;
                events.push(ParseEvent::ToolCallInc {
                    text: ch.to_string(),
                    tool: self.tool_name.clone(),
                });
            }
        }
    }

    fn step_in_string(&mut self, ch: char, events: &mut Vec<ParseEvent>) {
        if self.escaped {
            self.escaped = false;
            match self.state {
                State::InKey => self.buffer.push(ch),
                State::InValue => match self.current_key.as_str() {
                    "type" | "tool" => self.buffer.push(ch),
                    "content" if self.response_type == "response" => {
                        events.push(ParseEvent::Content(unescape(ch)));
                    }
                    _ => {}
                },
                _ => {}
            }
            return;
        }

        match ch {
            '\\' => self.escaped = true,
            '"' => {
                self.in_string = false;
                match self.state {
                    State::InKey => {
                        self.current_key = std::mem::take(&mut self.buffer);
                        self.state = State::Colon;
                    }
                    State::InValue => {
                        match self.current_key.as_str() {
                            "type" => self.response_type = std::mem::take(&mut self.buffer),
                            "tool" => self.tool_name = std::mem::take(&mut self.buffer),
                            _ => {}
                        }
                        self.state = State::InObject;
                    }
                    _ => {}
                }
            }
            _ => match self.state {
                State::InKey => self.buffer.push(ch),
                State::InValue => match self.current_key.as_str() {
                    "type" | "tool" => self.buffer.push(ch),
                    "content" if self.response_type == "response" => {
                        events.push(ParseEvent::Content(ch.to_string()));
                    }
                    _ => {}
                },
                _ => {}
            },
        }
    }

    fn step_text(&mut self, ch: char, events: &mut Vec<ParseEvent>) {
        match self.state {
            State::TextDetecting => {
                // Accumulating the "[Assistant called tools]:" prefix; the
                // tool list starts on the next line.
                if ch == '\n' {
                    self.state = State::TextFindingTool;
                }
            }
            State::TextFindingTool => {
                if ch == '-' {
                    self.state = State::TextReadingName;
                    self.buffer.clear();
                }
            }
            State::TextReadingName => {
                if ch == ' ' && self.buffer.is_empty() {
                    return;
                }
                if ch == '(' {
                    self.tool_name = std::mem::take(&mut self.buffer);
                    self.response_type = "tool_call".to_string();
                    self.state = State::TextReadingArgs;
                    self.depth = 0;
                    self.in_string = false;
                    self.escaped = false;
                } else {
                    self.buffer.push(ch);
                }
            }
            State::TextReadingArgs => {
                if ch == ')' && self.depth == 0 && !self.in_string {
                    self.state = State::TextFindingTool;
                    self.tool_name.clear();
                    return;
                }
                if self.in_string {
                    if self.escaped {
                        self.escaped = false;
                    } else if ch == '\\' {
                        self.escaped = true;
                    } else if ch == '"' {
                        self.in_string = false;
                    }
                } else {
                    match ch {
                        '"' => self.in_string = true,
                        '{' => self.depth += 1,
                        '}' => self.depth -= 1,
                        _ => {}
                    }
                }
                self.saw_tool_call = true;
                events.push(ParseEvent::ToolCallInc {
                    text: ch.to_string(),
                    tool: self.tool_name.clone(),
                });
            }
            _ => unreachable!("step_text only runs in text states"),
        }
    }
}

fn unescape(ch: char) -> String {
    match ch {
        'n' => "\n".to_string(),
        'r' => "\r".to_string(),
        't' => "\t".to_string(),
        '"' => "\"".to_string(),
        '\\' => "\\".to_string(),
        '/' => "/".to_string(),
        'b' => "\u{0008}".to_string(),
        'f' => "\u{000C}".to_string(),
        other => format!("\\{other}"),
    }
}
