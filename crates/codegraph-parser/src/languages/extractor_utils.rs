// ABOUTME: Shared utilities for language extractors
// ABOUTME: Provides common helper functions to reduce boilerplate across extractors

use crate::text_processor::doc_comment_text;
use std::path::Path;
use tree_sitter::Node;

/// Extract text from a tree-sitter Node
#[inline]
pub fn node_text<'a>(node: &Node, content: &'a str) -> &'a str {
    node.utf8_text(content.as_bytes()).unwrap_or("")
}

/// 1-based first line of a node.
#[inline]
pub fn start_line(node: &Node) -> u32 {
    node.start_position().row as u32 + 1
}

/// 1-based last line of a node.
#[inline]
pub fn end_line(node: &Node) -> u32 {
    node.end_position().row as u32 + 1
}

/// Find first child of a specific kind
pub fn child_by_kind<'a>(node: &Node<'a>, kind: &str) -> Option<Node<'a>> {
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.kind() == kind {
                return Some(child);
            }
        }
    }
    None
}

/// Find all children of a specific kind
pub fn children_by_kind<'a>(node: &Node<'a>, kind: &str) -> Vec<Node<'a>> {
    let mut result = Vec::new();
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.kind() == kind {
                result.push(child);
            }
        }
    }
    result
}

pub fn named_children<'a>(node: &Node<'a>) -> Vec<Node<'a>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Get text of a child by field name
pub fn child_text_by_field(node: &Node, field_name: &str, content: &str) -> Option<String> {
    node.child_by_field_name(field_name)
        .map(|child| node_text(&child, content).to_string())
}

/// First paragraph of a `/** */` comment directly above `node`.
pub fn preceding_doc_comment(node: &Node, content: &str) -> Option<String> {
    let prev = node.prev_sibling()?;
    if !prev.kind().contains("comment") {
        return None;
    }
    // Only a comment touching the declaration counts.
    if end_line(&prev) + 1 < start_line(node) {
        return None;
    }
    doc_comment_text(node_text(&prev, content))
}

/// Line of the first syntax error or missing node, if the tree has any.
pub fn first_error_line(root: &Node) -> Option<u32> {
    if !root.has_error() {
        return None;
    }
    let mut cursor = root.walk();
    let mut stack = vec![*root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(start_line(&node));
        }
        if node.has_error() {
            let mut children: Vec<Node> = node.children(&mut cursor).collect();
            children.reverse();
            stack.extend(children);
        }
    }
    Some(start_line(root))
}

/// File name without its extension.
pub fn file_stem(file_path: &str) -> String {
    Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Name of the directory holding `file_path`.
pub fn parent_dir_name(file_path: &str) -> Option<String> {
    Path::new(file_path)
        .parent()?
        .file_name()?
        .to_str()
        .map(str::to_string)
}
