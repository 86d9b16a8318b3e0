mod common;

use common::*;
use corepersist_common::id::Id;
use corepersist_common::version::Version;
use corepersist_graph::edge::{MarkedEdge, SearchByEdge, SearchByEdgeType, SearchByIdType};
use corepersist_graph::error::GraphResult;
use corepersist_graph::meta::DirectedEdgeMeta;
use corepersist_graph::shard::Shard;
use smol_str::SmolStr;

#[test]
fn test_edge_is_readable_from_every_direction() -> GraphResult<()> {
    let ctx = create_default_context();
    let user = Id::generate("user");
    let post = Id::generate("post");
    let written = ctx.manager.write_edge(&ctx.scope, edge(&user, &post, 100))?;

    let from_source = collect(
        ctx.manager
            .load_edges_from_source(&ctx.scope, &SearchByEdgeType::new(user.clone(), "likes"))?,
    )?;
    let by_target_type = collect(ctx.manager.load_edges_from_source_by_type(
        &ctx.scope,
        &SearchByIdType::new(user.clone(), "likes", "post"),
    )?)?;
    let to_target = collect(
        ctx.manager
            .load_edges_to_target(&ctx.scope, &SearchByEdgeType::new(post.clone(), "likes"))?,
    )?;
    let by_source_type = collect(ctx.manager.load_edges_to_target_by_type(
        &ctx.scope,
        &SearchByIdType::new(post.clone(), "likes", "user"),
    )?)?;
    let versions = collect(ctx.manager.load_edge_versions(
        &ctx.scope,
        &SearchByEdge::new(user.clone(), "likes", post.clone()),
    )?)?;
    for edges in [from_source, by_target_type, to_target, by_source_type, versions] {
        assert_eq!(edges, vec![written.clone()]);
    }

    // A different id type finds nothing.
    let by_other_type = collect(ctx.manager.load_edges_from_source_by_type(
        &ctx.scope,
        &SearchByIdType::new(user, "likes", "comment"),
    )?)?;
    assert!(by_other_type.is_empty());
    Ok(())
}

#[test]
fn test_edge_metadata() -> GraphResult<()> {
    let ctx = create_default_context();
    let user = Id::generate("user");
    let post = Id::generate("post");
    let comment = Id::generate("comment");
    ctx.manager.write_edge(&ctx.scope, edge(&user, &post, 100))?;
    ctx.manager.write_edge(&ctx.scope, edge(&user, &comment, 200))?;
    ctx.manager.write_edge(
        &ctx.scope,
        MarkedEdge::new(user.clone(), "follows", Id::generate("user"), Version::from_parts(300, 1)),
    )?;

    assert_eq!(
        ctx.manager.get_edge_types_from_source(&ctx.scope, &user)?,
        vec![SmolStr::new("follows"), SmolStr::new("likes")]
    );
    assert_eq!(
        ctx.manager.get_id_types_from_source(&ctx.scope, &user, "likes")?,
        vec![SmolStr::new("comment"), SmolStr::new("post")]
    );
    assert_eq!(
        ctx.manager.get_edge_types_to_target(&ctx.scope, &post)?,
        vec![SmolStr::new("likes")]
    );
    assert_eq!(
        ctx.manager.get_id_types_to_target(&ctx.scope, &post, "likes")?,
        vec![SmolStr::new("user")]
    );
    Ok(())
}

#[test]
fn test_mark_then_delete() -> GraphResult<()> {
    let ctx = create_default_context();
    let user = Id::generate("user");
    let post = Id::generate("post");
    let written = ctx.manager.write_edge(&ctx.scope, edge(&user, &post, 100))?;

    // 1. A marked edge is hidden unless asked for
    let marked = ctx.manager.mark_edge(&ctx.scope, written.clone())?;
    assert!(marked.deleted);
    let search = SearchByEdgeType::new(user.clone(), "likes");
    assert!(collect(ctx.manager.load_edges_from_source(&ctx.scope, &search)?)?.is_empty());
    let with_marked = collect(
        ctx.manager
            .load_edges_from_source(&ctx.scope, &search.clone().include_marked())?,
    )?;
    assert_eq!(with_marked, vec![marked.clone()]);
    let versions = collect(ctx.manager.load_edge_versions(
        &ctx.scope,
        &SearchByEdge::new(user.clone(), "likes", post.clone()),
    )?)?;
    assert_eq!(versions, vec![marked.clone()]);

    // 2. Deleting removes every copy and the now unused edge type
    ctx.manager.delete_edge(&ctx.scope, &marked)?;
    assert!(
        collect(
            ctx.manager
                .load_edges_from_source(&ctx.scope, &search.include_marked())?
        )?
        .is_empty()
    );
    assert!(
        ctx.manager
            .get_edge_types_from_source(&ctx.scope, &user)?
            .is_empty()
    );
    assert!(
        ctx.manager
            .get_edge_types_to_target(&ctx.scope, &post)?
            .is_empty()
    );
    Ok(())
}

#[test]
fn test_marking_an_unwritten_edge_counts_it() -> GraphResult<()> {
    let ctx = create_default_context();
    let marked = ctx.manager.mark_edge(
        &ctx.scope,
        edge(&Id::generate("user"), &Id::generate("post"), 100),
    )?;

    // The mark lands on the root shard of every meta and is counted there
    for meta in DirectedEdgeMeta::all_for_edge(&marked) {
        assert_eq!(
            ctx.manager
                .counter()
                .get_count(&ctx.scope, &Shard::ROOT, &meta)?,
            1
        );
    }

    // Marking it again finds the existing copies and counts nothing new
    ctx.manager.mark_edge(&ctx.scope, marked.clone())?;
    for meta in DirectedEdgeMeta::all_for_edge(&marked) {
        assert_eq!(
            ctx.manager
                .counter()
                .get_count(&ctx.scope, &Shard::ROOT, &meta)?,
            1
        );
    }
    Ok(())
}

#[test]
fn test_delete_keeps_types_still_in_use() -> GraphResult<()> {
    let ctx = create_default_context();
    let user = Id::generate("user");
    let first = ctx
        .manager
        .write_edge(&ctx.scope, edge(&user, &Id::generate("post"), 100))?;
    ctx.manager
        .write_edge(&ctx.scope, edge(&user, &Id::generate("post"), 200))?;

    ctx.manager.delete_edge(&ctx.scope, &first)?;
    assert_eq!(
        ctx.manager.get_edge_types_from_source(&ctx.scope, &user)?,
        vec![SmolStr::new("likes")]
    );
    Ok(())
}

#[test]
fn test_resume_from_last_edge() -> GraphResult<()> {
    let ctx = create_default_context();
    let user = Id::generate("user");
    for ts in 1..=20 {
        ctx.manager
            .write_edge(&ctx.scope, edge(&user, &Id::generate("post"), ts))?;
    }
    let search = SearchByEdgeType::new(user, "likes");
    let all = collect(ctx.manager.load_edges_from_source(&ctx.scope, &search)?)?;
    assert_eq!(all.len(), 20);

    // 1. Read pages of seven, resuming from the last edge of each page
    let mut pages = Vec::new();
    let mut last: Option<MarkedEdge> = None;
    loop {
        let resumed = search.clone().with_last(last.clone());
        let page = ctx
            .manager
            .load_edges_from_source(&ctx.scope, &resumed)?
            // The resume point is returned again.
            .skip(usize::from(last.is_some()))
            .take(7)
            .collect::<GraphResult<Vec<_>>>()?;
        if page.is_empty() {
            break;
        }
        last = page.last().cloned();
        pages.extend(page);
    }

    // 2. The pages add up to the full scan
    assert_eq!(pages, all);
    Ok(())
}

#[test]
fn test_max_version_bounds_the_scan() -> GraphResult<()> {
    let ctx = create_default_context();
    let user = Id::generate("user");
    for ts in 1..=12 {
        ctx.manager
            .write_edge(&ctx.scope, edge(&user, &Id::generate("post"), ts))?;
    }

    let search =
        SearchByEdgeType::new(user, "likes").with_max_version(Version::from_parts(5, u64::MAX));
    let edges = collect(ctx.manager.load_edges_from_source(&ctx.scope, &search)?)?;
    assert_eq!(timestamps(&edges), vec![5, 4, 3, 2, 1]);

    let ascending = search.with_order(corepersist_storage::column::Order::Ascending);
    let edges = collect(ctx.manager.load_edges_from_source(&ctx.scope, &ascending)?)?;
    assert_eq!(timestamps(&edges), vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[test]
fn test_marked_node_hides_older_edges() -> GraphResult<()> {
    let ctx = create_default_context();
    let user = Id::generate("user");
    let post = Id::generate("post");
    let other = Id::generate("post");
    ctx.manager.write_edge(&ctx.scope, edge(&user, &post, 100))?;
    ctx.manager.write_edge(&ctx.scope, edge(&user, &other, 150))?;
    ctx.manager.write_edge(&ctx.scope, edge(&user, &post, 300))?;

    // 1. Marking the post at 200 hides its edges up to 200 from either end
    ctx.manager
        .mark_node(&ctx.scope, &post, Version::from_parts(200, 1))?;
    let from_user = SearchByEdgeType::new(user.clone(), "likes");
    let edges = collect(ctx.manager.load_edges_from_source(&ctx.scope, &from_user)?)?;
    assert_eq!(timestamps(&edges), vec![300, 150]);
    let to_post = SearchByEdgeType::new(post.clone(), "likes");
    let edges = collect(ctx.manager.load_edges_to_target(&ctx.scope, &to_post)?)?;
    assert_eq!(timestamps(&edges), vec![300]);

    // 2. Unfiltered reads still see them, and an older mark does not lower the existing one
    let edges = collect(
        ctx.manager
            .load_edges_to_target(&ctx.scope, &to_post.clone().include_marked())?,
    )?;
    assert_eq!(timestamps(&edges), vec![300, 100]);
    ctx.manager
        .mark_node(&ctx.scope, &post, Version::from_parts(50, 1))?;
    let edges = collect(ctx.manager.load_edges_to_target(&ctx.scope, &to_post)?)?;
    assert_eq!(timestamps(&edges), vec![300]);
    Ok(())
}

#[test]
fn test_delete_node_removes_its_edges() -> GraphResult<()> {
    let ctx = create_default_context();
    let user = Id::generate("user");
    let post = Id::generate("post");
    let fan = Id::generate("user");
    for ts in 1..=15 {
        ctx.manager
            .write_edge(&ctx.scope, edge(&user, &Id::generate("post"), ts))?;
    }
    ctx.manager.write_edge(&ctx.scope, edge(&fan, &user, 20))?;
    ctx.manager.write_edge(&ctx.scope, edge(&fan, &post, 21))?;

    // 1. Deleting the user removes the edges on both of its sides
    ctx.manager
        .delete_node(&ctx.scope, &user, Version::from_parts(100, 1))?;
    let from_user = SearchByEdgeType::new(user.clone(), "likes").include_marked();
    assert!(collect(ctx.manager.load_edges_from_source(&ctx.scope, &from_user)?)?.is_empty());
    let to_user = SearchByEdgeType::new(user.clone(), "likes").include_marked();
    assert!(collect(ctx.manager.load_edges_to_target(&ctx.scope, &to_user)?)?.is_empty());
    assert!(ctx.manager.get_edge_types_from_source(&ctx.scope, &user)?.is_empty());
    assert!(ctx.manager.get_edge_types_to_target(&ctx.scope, &user)?.is_empty());

    // 2. Edges of other nodes are untouched
    let from_fan = SearchByEdgeType::new(fan.clone(), "likes");
    let edges = collect(ctx.manager.load_edges_from_source(&ctx.scope, &from_fan)?)?;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].target, post);

    // 3. The mark is gone, so a later edge of the same node is visible
    assert_eq!(ctx.manager.compact_node(&ctx.scope, &user)?, 0);
    ctx.manager.write_edge(&ctx.scope, edge(&user, &post, 50))?;
    let edges = collect(
        ctx.manager
            .load_edges_from_source(&ctx.scope, &SearchByEdgeType::new(user, "likes"))?,
    )?;
    assert_eq!(timestamps(&edges), vec![50]);
    Ok(())
}
