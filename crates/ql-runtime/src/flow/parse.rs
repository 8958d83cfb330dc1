use super::token::{AlternativeMode, Tag, TagKind, Token};

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// `None` for `{else}`.
    pub condition: Option<String>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Interpolation(String),
    Block {
        sections: Vec<Section>,
        offset: usize,
    },
    Inline {
        condition: String,
        when_true: String,
        when_false: String,
    },
    Alternatives {
        mode: AlternativeMode,
        options: Vec<String>,
        offset: usize,
    },
}

struct OpenSection {
    condition: Option<String>,
    raw: String,
    body: Vec<Node>,
}

struct OpenBlock {
    offset: usize,
    sections: Vec<OpenSection>,
    has_else: bool,
}

impl OpenBlock {
    fn body(&mut self) -> &mut Vec<Node> {
        let last = self.sections.len() - 1;
        &mut self.sections[last].body
    }

    /// Flattens a block that was never closed back into text, markers
    /// included, so its content still renders.
    fn into_literal(self) -> Vec<Node> {
        let mut nodes = Vec::new();
        for section in self.sections {
            nodes.push(Node::Text(section.raw));
            nodes.extend(section.body);
        }
        nodes
    }
}

fn push_node(body: &mut Vec<Node>, node: Node) {
    if let (Node::Text(text), Some(Node::Text(previous))) = (&node, body.last_mut()) {
        previous.push_str(text);
        return;
    }
    body.push(node);
}

/// Single pass over the token stream; open blocks live on an explicit stack
/// so inner blocks close before the block that contains them.
pub fn parse(tokens: Vec<Token>) -> Vec<Node> {
    let mut root = Vec::new();
    let mut stack: Vec<OpenBlock> = Vec::new();

    for token in tokens {
        let node = match token {
            Token::Text(text) => Node::Text(text),
            Token::Interpolation(marker) => Node::Interpolation(marker),
            Token::Tag(Tag { kind, raw, offset }) => match kind {
                TagKind::Open(condition) => {
                    stack.push(OpenBlock {
                        offset,
                        sections: vec![OpenSection {
                            condition: Some(condition),
                            raw,
                            body: Vec::new(),
                        }],
                        has_else: false,
                    });
                    continue;
                }
                TagKind::Elif(condition) => match stack.last_mut() {
                    Some(block) if !block.has_else => {
                        block.sections.push(OpenSection {
                            condition: Some(condition),
                            raw,
                            body: Vec::new(),
                        });
                        continue;
                    }
                    _ => stray(raw, offset),
                },
                TagKind::Else => match stack.last_mut() {
                    Some(block) if !block.has_else => {
                        block.has_else = true;
                        block.sections.push(OpenSection {
                            condition: None,
                            raw,
                            body: Vec::new(),
                        });
                        continue;
                    }
                    _ => stray(raw, offset),
                },
                TagKind::Close => match stack.pop() {
                    Some(block) => Node::Block {
                        offset: block.offset,
                        sections: block
                            .sections
                            .into_iter()
                            .map(|section| Section {
                                condition: section.condition,
                                body: section.body,
                            })
                            .collect(),
                    },
                    None => stray(raw, offset),
                },
                TagKind::Inline {
                    condition,
                    when_true,
                    when_false,
                } => Node::Inline {
                    condition,
                    when_true,
                    when_false,
                },
                TagKind::Alternatives { mode, options } => Node::Alternatives {
                    mode,
                    options,
                    offset,
                },
            },
        };
        let body = match stack.last_mut() {
            Some(block) => block.body(),
            None => &mut root,
        };
        push_node(body, node);
    }

    while let Some(block) = stack.pop() {
        tracing::warn!(offset = block.offset, "unterminated conditional block kept as text");
        let body = match stack.last_mut() {
            Some(parent) => parent.body(),
            None => &mut root,
        };
        for node in block.into_literal() {
            push_node(body, node);
        }
    }
    root
}

fn stray(raw: String, offset: usize) -> Node {
    tracing::warn!(offset, marker = %raw, "block marker without an open block kept as text");
    Node::Text(raw)
}

#[cfg(test)]
mod parse_tests {
    use super::super::token::tokenize;
    use super::*;

    fn text(value: &str) -> Node {
        Node::Text(value.to_string())
    }

    #[test]
    fn nests_blocks_innermost_first() {
        let nodes = parse(tokenize("a{x}b{y}c{/}d{else}e{/}f"));
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0], text("a"));
        assert_eq!(nodes[2], text("f"));
        let Node::Block { sections, offset } = &nodes[1] else {
            panic!("expected a block, got {:?}", nodes[1]);
        };
        assert_eq!(*offset, 1);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].condition.as_deref(), Some("x"));
        assert_eq!(sections[1].condition, None);
        assert_eq!(sections[1].body, vec![text("e")]);
        let Node::Block { sections: inner, .. } = &sections[0].body[1] else {
            panic!("expected a nested block");
        };
        assert_eq!(inner[0].body, vec![text("c")]);
    }

    #[test]
    fn unterminated_block_becomes_text() {
        let nodes = parse(tokenize("start {x}open{else}other"));
        assert_eq!(nodes, vec![text("start {x}open{else}other")]);
    }

    #[test]
    fn stray_markers_become_text() {
        let nodes = parse(tokenize("a{/}b{else}c{elif z}"));
        assert_eq!(nodes, vec![text("a{/}b{else}c{elif z}")]);
    }

    #[test]
    fn second_else_is_literal() {
        let nodes = parse(tokenize("{x}a{else}b{else}c{/}"));
        let Node::Block { sections, .. } = &nodes[0] else {
            panic!("expected a block");
        };
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].body, vec![text("b{else}c")]);
    }

    #[test]
    fn alternatives_inside_blocks_keep_their_offset() {
        let nodes = parse(tokenize("{x}{a|b}{/}"));
        let Node::Block { sections, .. } = &nodes[0] else {
            panic!("expected a block");
        };
        assert!(matches!(
            sections[0].body[0],
            Node::Alternatives { offset: 3, .. }
        ));
    }
}
