use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

/// Emphasis applied to a plain-text card element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
}

impl TextStyle {
    pub const PLAIN: TextStyle = TextStyle {
        bold: false,
        italic: false,
    };
    pub const BOLD: TextStyle = TextStyle {
        bold: true,
        italic: false,
    };
    pub const ITALIC: TextStyle = TextStyle {
        bold: false,
        italic: true,
    };

    fn to_value(self) -> Option<Value> {
        if !self.bold && !self.italic {
            return None;
        }
        let mut style = Map::new();
        if self.bold {
            style.insert("bold".to_string(), Value::Bool(true));
        }
        if self.italic {
            style.insert("italic".to_string(), Value::Bool(true));
        }
        Some(Value::Object(style))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ButtonKind {
    #[default]
    Default,
    Primary,
    Danger,
}

impl ButtonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonKind::Default => "default",
            ButtonKind::Primary => "primary",
            ButtonKind::Danger => "danger",
        }
    }
}

/// Header color themes accepted by the card renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderTemplate {
    #[default]
    Blue,
    Wathet,
    Turquoise,
    Green,
    Yellow,
    Orange,
    Red,
    Carmine,
    Violet,
    Purple,
    Indigo,
    Grey,
}

impl HeaderTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeaderTemplate::Blue => "blue",
            HeaderTemplate::Wathet => "wathet",
            HeaderTemplate::Turquoise => "turquoise",
            HeaderTemplate::Green => "green",
            HeaderTemplate::Yellow => "yellow",
            HeaderTemplate::Orange => "orange",
            HeaderTemplate::Red => "red",
            HeaderTemplate::Carmine => "carmine",
            HeaderTemplate::Violet => "violet",
            HeaderTemplate::Purple => "purple",
            HeaderTemplate::Indigo => "indigo",
            HeaderTemplate::Grey => "grey",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardHeader {
    pub title: String,
    pub template: HeaderTemplate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CardElement {
    Text { content: String, style: TextStyle },
    Markdown { content: String },
    Image { image_key: String, alt: String },
    Button {
        text: String,
        value: Value,
        kind: ButtonKind,
    },
    Divider,
}

fn plain_text(content: &str) -> Value {
    json!({ "tag": "plain_text", "content": content })
}

impl CardElement {
    pub fn to_value(&self) -> Value {
        match self {
            CardElement::Text { content, style } => {
                let mut text = plain_text(content);
                if let Some(style) = style.to_value() {
                    text["style"] = style;
                }
                json!({ "tag": "div", "text": text })
            }
            CardElement::Markdown { content } => json!({ "tag": "markdown", "content": content }),
            CardElement::Image { image_key, alt } => json!({
                "tag": "img",
                "img_key": image_key,
                "alt": plain_text(alt),
            }),
            CardElement::Button { text, value, kind } => json!({
                "tag": "action",
                "actions": [{
                    "tag": "button",
                    "text": plain_text(text),
                    "type": kind.as_str(),
                    "value": value,
                }],
            }),
            CardElement::Divider => json!({ "tag": "hr" }),
        }
    }
}

/// Interactive message card.
///
/// Elements render in insertion order. Every `add_*` call appends exactly one
/// element; `set_header` replaces any previous header.
///
/// ```
/// use aio_feishu::{ButtonKind, Card, HeaderTemplate, TextStyle};
/// use serde_json::json;
///
/// let card = Card::new()
///     .set_header("Approval", HeaderTemplate::Orange)
///     .add_text("Expense claim #42", TextStyle::BOLD)
///     .add_divider()
///     .add_button("Approve", json!({"claim": 42}), ButtonKind::Primary);
/// assert_eq!(card.elements().len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Card {
    header: Option<CardHeader>,
    elements: Vec<CardElement>,
}

impl Card {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_text(mut self, text: impl Into<String>, style: TextStyle) -> Self {
        self.elements.push(CardElement::Text {
            content: text.into(),
            style,
        });
        self
    }

    pub fn add_markdown(mut self, content: impl Into<String>) -> Self {
        self.elements.push(CardElement::Markdown {
            content: content.into(),
        });
        self
    }

    pub fn add_image(mut self, image_key: impl Into<String>, alt: impl Into<String>) -> Self {
        self.elements.push(CardElement::Image {
            image_key: image_key.into(),
            alt: alt.into(),
        });
        self
    }

    /// Append a button; `value` is echoed back in the card callback.
    pub fn add_button(mut self, text: impl Into<String>, value: Value, kind: ButtonKind) -> Self {
        self.elements.push(CardElement::Button {
            text: text.into(),
            value,
            kind,
        });
        self
    }

    pub fn add_divider(mut self) -> Self {
        self.elements.push(CardElement::Divider);
        self
    }

    pub fn set_header(mut self, title: impl Into<String>, template: HeaderTemplate) -> Self {
        self.header = Some(CardHeader {
            title: title.into(),
            template,
        });
        self
    }

    pub fn elements(&self) -> &[CardElement] {
        &self.elements
    }

    pub fn header(&self) -> Option<&CardHeader> {
        self.header.as_ref()
    }

    /// Feishu card JSON.
    pub fn to_value(&self) -> Value {
        let mut card = json!({
            "config": { "wide_screen_mode": true },
            "elements": self.elements.iter().map(CardElement::to_value).collect::<Vec<_>>(),
        });
        if let Some(header) = &self.header {
            card["header"] = json!({
                "title": plain_text(&header.title),
                "template": header.template.as_str(),
            });
        }
        card
    }
}

impl Serialize for Card {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
