//! The streamed page.

use std::fmt::Write;

use edge_sdk::prelude::{Template, ITEMS_BINDING};

/// Template name; the extension selects HTML escaping.
pub const TEMPLATE_NAME: &str = "streaming/index.html";

const HEAD: &str = "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>";

const STYLE: &str = "</title>\n<style>\n\
    body { font-family: system-ui, sans-serif; margin: 2rem; }\n\
    .item { color: #0a7d2c; }\n\
    </style>\n</head>\n<body>\n<h1>";

/// Build the page for `n` items.
///
/// The shadow root is static and carries every slot up front, so it goes
/// out in the first chunk. Each item then streams as a light-DOM element
/// assigned to its slot.
pub fn page_template(n: usize) -> Template {
    let mut slots = String::from(
        "</h1>\n<div id=\"items\">\n<template shadowrootmode=\"open\">\n<ol>\n",
    );
    for i in 0..n {
        let _ = writeln!(
            slots,
            "<li><slot name=\"item-{i}\">Waiting for item {i}\u{2026}</slot></li>",
            i = i
        );
    }
    slots.push_str("</ol>\n<slot></slot>\n</template>\n");

    Template::builder(TEMPLATE_NAME)
        .text(HEAD)
        .var("title")
        .text(STYLE)
        .var("title")
        .text(slots)
        .for_each(ITEMS_BINDING, |body| {
            body.text("<span class=\"item\" slot=\"item-")
                .item()
                .text("\">Item ")
                .item()
                .text(" loaded</span>\n")
                .empty("<p>Nothing to stream.</p>\n")
        })
        .text("</div>\n</body>\n</html>\n")
        .build()
}
