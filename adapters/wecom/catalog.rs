//! Category tree handling / 目录树处理
//!
//! The platform returns one flat category list. We rebuild the tree,
//! filter published nodes, sort children, and walk depth-first emitting a
//! slug-chain path per leaf.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::adapters::common::{classify_doc_type, cmp_zh_titles};
use crate::adapters::DocEntry;
use crate::models::DevMode;
use crate::utils::slugify;

/// One node of the flat category list / 扁平目录节点
#[derive(Debug, Clone, Deserialize)]
pub struct RawCategory {
    pub category_id: i64,
    #[serde(default)]
    pub parent_id: i64,
    pub title: String,
    #[serde(default)]
    pub order_id: i64,
    /// 2 = published / 2为已发布
    #[serde(default)]
    pub status: i32,
    /// 0 = folder / 0为目录
    #[serde(rename = "type", default)]
    pub cat_type: i32,
    #[serde(default)]
    pub doc_id: i64,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug)]
pub struct CategoryNode {
    pub raw: RawCategory,
    pub children: Vec<CategoryNode>,
}

/// Build the tree from the flat list / 由扁平列表构建目录树
///
/// Nodes whose status is not 2 are dropped together with their subtrees.
/// Children sort by order_id first, then by pinyin-collated title.
pub fn build_tree(flat: Vec<RawCategory>) -> Vec<CategoryNode> {
    let mut by_parent: HashMap<i64, Vec<RawCategory>> = HashMap::new();
    for cat in flat {
        if cat.status != 2 {
            continue;
        }
        by_parent.entry(cat.parent_id).or_default().push(cat);
    }
    build_children(&mut by_parent, 0)
}

fn build_children(by_parent: &mut HashMap<i64, Vec<RawCategory>>, parent_id: i64) -> Vec<CategoryNode> {
    let mut children = by_parent.remove(&parent_id).unwrap_or_default();
    children.sort_by(|a, b| {
        a.order_id
            .cmp(&b.order_id)
            .then_with(|| cmp_zh_titles(&a.title, &b.title))
    });
    children
        .into_iter()
        .map(|raw| {
            let id = raw.category_id;
            CategoryNode {
                raw,
                children: build_children(by_parent, id),
            }
        })
        .collect()
}

/// Detect dev mode from URL fragments / 从URL片段识别开发模式
pub fn detect_dev_mode(url: Option<&str>) -> DevMode {
    match url {
        Some(u) if u.contains("/is_third/1") => DevMode::ThirdParty,
        Some(u) if u.contains("/is_sp/1") => DevMode::ServiceProvider,
        _ => DevMode::Internal,
    }
}

/// Slug for one segment, collision-resolved by category id
/// / 单段slug，冲突时追加目录ID
fn segment_slug(ordinal: i64, title: &str, category_id: i64, used: &mut HashSet<String>) -> String {
    let mut slug = slugify(title);
    if slug.is_empty() {
        slug = format!("cat-{}", category_id);
    }
    let mut segment = format!("{:03}-{}", ordinal, slug);
    if !used.insert(segment.clone()) {
        segment = format!("{:03}-{}-{}", ordinal, slug, category_id);
        used.insert(segment.clone());
    }
    segment
}

/// Depth-first walk emitting one entry per leaf / 深度优先遍历产出文档条目
pub fn walk_tree(nodes: &[CategoryNode], base_url: &str) -> Vec<DocEntry> {
    let mut entries = Vec::new();
    let mut used = HashSet::new();
    walk_level(nodes, &[], base_url, &mut used, &mut entries);
    entries
}

fn walk_level(
    nodes: &[CategoryNode],
    prefix: &[String],
    base_url: &str,
    used: &mut HashSet<String>,
    out: &mut Vec<DocEntry>,
) {
    for node in nodes.iter() {
        let segment = segment_slug(node.raw.order_id, &node.raw.title, node.raw.category_id, used);
        let is_folder = node.raw.cat_type == 0 || (node.raw.doc_id == 0 && !node.children.is_empty());

        if is_folder {
            let mut next_prefix = prefix.to_vec();
            next_prefix.push(segment);
            // 子目录有自己的命名空间
            let mut child_used = HashSet::new();
            walk_level(&node.children, &next_prefix, base_url, &mut child_used, out);
        } else if node.raw.doc_id != 0 {
            let mut path_segments = prefix.to_vec();
            path_segments.push(segment);
            let path = path_segments.join("/");
            let mut entry = DocEntry::new(
                path.clone(),
                node.raw.title.clone(),
                node.raw.doc_id.to_string(),
            );
            entry.dev_mode = Some(detect_dev_mode(node.raw.url.as_deref()));
            entry.doc_type = classify_doc_type(&node.raw.title, &path);
            entry.source_url = Some(format!("{}/document/path/{}", base_url, node.raw.doc_id));
            out.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: i64, parent: i64, title: &str, order: i64, cat_type: i32, doc_id: i64) -> RawCategory {
        RawCategory {
            category_id: id,
            parent_id: parent,
            title: title.to_string(),
            order_id: order,
            status: 2,
            cat_type,
            doc_id,
            url: None,
        }
    }

    #[test]
    fn test_tree_filters_unpublished() {
        let mut hidden = cat(3, 0, "草稿", 1, 1, 33);
        hidden.status = 1;
        let tree = build_tree(vec![cat(1, 0, "通讯录", 2, 0, 0), hidden]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].raw.title, "通讯录");
    }

    #[test]
    fn test_children_sorted_by_order_then_pinyin() {
        let tree = build_tree(vec![
            cat(1, 0, "目录", 1, 0, 0),
            cat(2, 1, "乙文档", 5, 1, 22),
            cat(3, 1, "甲文档", 5, 1, 33),
            cat(4, 1, "先行文档", 1, 1, 44),
        ]);
        let titles: Vec<&str> = tree[0].children.iter().map(|c| c.raw.title.as_str()).collect();
        assert_eq!(titles[0], "先行文档");
        // order_id 相同按拼音首字母比较：甲(j) 在 乙(y) 前
        assert_eq!(titles, vec!["先行文档", "甲文档", "乙文档"]);
    }

    #[test]
    fn test_walk_emits_slug_chain() {
        let tree = build_tree(vec![
            cat(1, 0, "Server API", 1, 0, 0),
            cat(2, 1, "Send Message", 1, 1, 90236),
        ]);
        let entries = walk_tree(&tree, "https://developer.work.weixin.qq.com");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "001-server-api/001-send-message");
        assert_eq!(entries[0].platform_id, "90236");
        assert!(entries[0].source_url.as_deref().unwrap().ends_with("/90236"));
    }

    #[test]
    fn test_slug_collision_appends_category_id() {
        let tree = build_tree(vec![
            cat(1, 0, "目录", 1, 0, 0),
            // order_id与slug都相同，第二个叶子追加目录ID
            cat(2, 1, "Send", 1, 1, 22),
            cat(3, 1, "Send", 1, 1, 33),
        ]);
        let entries = walk_tree(&tree, "https://example.com");
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].path, entries[1].path);
        assert!(entries[1].path.ends_with("-3"));
    }

    #[test]
    fn test_dev_mode_detection() {
        assert_eq!(detect_dev_mode(Some("/doc/a/is_third/1")), DevMode::ThirdParty);
        assert_eq!(detect_dev_mode(Some("/doc/a/is_sp/1")), DevMode::ServiceProvider);
        assert_eq!(detect_dev_mode(Some("/doc/a")), DevMode::Internal);
        assert_eq!(detect_dev_mode(None), DevMode::Internal);
    }
}
