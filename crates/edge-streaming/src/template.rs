//! Compiled template representation.
//!
//! Templates are built in code; there is no parser. A template is a flat
//! list of nodes, where a [`Node::Loop`] iterates a source bound in the
//! render context and renders its body once per pulled item.

/// A piece of a loop body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text.
    Text(String),
    /// The current item's index.
    Item,
}

/// A loop over a bound source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopBlock {
    /// Context name of the source to iterate.
    pub binding: String,
    /// Body rendered once per item.
    pub body: Vec<Segment>,
    /// Rendered instead of the body when the source yields nothing.
    pub empty: Option<String>,
}

/// A top-level template node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Literal text, emitted without waiting.
    Text(String),
    /// A text value looked up in the context and escaped.
    Var(String),
    /// Iteration over a bound source.
    Loop(LoopBlock),
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Create a template from nodes.
    pub fn new(name: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            nodes,
        }
    }

    /// Create a template using the builder.
    pub fn builder(name: impl Into<String>) -> TemplateBuilder {
        TemplateBuilder::new(name)
    }

    /// Template name (used to pick autoescaping and for logs).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The nodes in render order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Names of every source the template iterates.
    pub fn loop_bindings(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Loop(block) => Some(block.binding.as_str()),
            _ => None,
        })
    }
}

/// Builder for ergonomic template definition.
pub struct TemplateBuilder {
    name: String,
    nodes: Vec<Node>,
}

impl TemplateBuilder {
    /// Create a new template builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    /// Append literal text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.nodes.push(Node::Text(text.into()));
        self
    }

    /// Append an escaped context variable.
    pub fn var(mut self, name: impl Into<String>) -> Self {
        self.nodes.push(Node::Var(name.into()));
        self
    }

    /// Append a loop over the source bound as `binding`.
    pub fn for_each(
        mut self,
        binding: impl Into<String>,
        body: impl FnOnce(LoopBuilder) -> LoopBuilder,
    ) -> Self {
        let built = body(LoopBuilder::default());
        self.nodes.push(Node::Loop(LoopBlock {
            binding: binding.into(),
            body: built.body,
            empty: built.empty,
        }));
        self
    }

    /// Build the template.
    pub fn build(self) -> Template {
        Template {
            name: self.name,
            nodes: self.nodes,
        }
    }
}

/// Builder for a loop body.
#[derive(Default)]
pub struct LoopBuilder {
    body: Vec<Segment>,
    empty: Option<String>,
}

impl LoopBuilder {
    /// Append literal text to the body.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body.push(Segment::Text(text.into()));
        self
    }

    /// Append the current item's index to the body.
    pub fn item(mut self) -> Self {
        self.body.push(Segment::Item);
        self
    }

    /// Set the text rendered when the source yields nothing.
    pub fn empty(mut self, text: impl Into<String>) -> Self {
        self.empty = Some(text.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_produces_nodes_in_order() {
        let template = Template::builder("list.html")
            .text("<ul>")
            .for_each("items", |body| body.text("<li>").item().text("</li>").empty("none"))
            .text("</ul>")
            .build();

        assert_eq!(template.name(), "list.html");
        assert_eq!(template.nodes().len(), 3);
        assert_eq!(
            template.nodes()[1],
            Node::Loop(LoopBlock {
                binding: "items".to_string(),
                body: vec![
                    Segment::Text("<li>".to_string()),
                    Segment::Item,
                    Segment::Text("</li>".to_string()),
                ],
                empty: Some("none".to_string()),
            })
        );
    }

    #[test]
    fn test_loop_bindings() {
        let template = Template::builder("t")
            .var("title")
            .for_each("a", |b| b.item())
            .for_each("b", |b| b.item())
            .build();
        assert_eq!(template.loop_bindings().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
