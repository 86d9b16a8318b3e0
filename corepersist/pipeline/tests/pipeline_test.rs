mod common;

use std::collections::BTreeSet;

use common::*;
use corepersist_common::id::Id;
use corepersist_pipeline::collect::{ResultsPageCollector, SearchCollector, collect_ids};
use corepersist_pipeline::config::PipelineConfig;
use corepersist_pipeline::context::PipelineContext;
use corepersist_pipeline::error::PipelineResult;
use corepersist_pipeline::stage::{Direction, ReadStage, from_ids, search_candidates};
use rand::seq::index::sample;

#[test]
fn test_connection_pages_resume_exactly() -> PipelineResult<()> {
    let ctx = create_context();
    let owner = ctx.scope.application().clone();
    let users = ctx.connected_users(&owner, 25);

    // 1. A single unpaginated scan, newest edge first
    let mut pipeline = ctx.pipeline(100, None);
    let stage = from_ids([owner.clone()])
        .read_graph_connections(&mut pipeline, ctx.graph.clone(), "users", Direction::Outgoing)
        .load_entities(&pipeline, ctx.manager.clone());
    let full = ResultsPageCollector::for_context(&pipeline).collect(stage)?;
    assert_eq!(full.cursor, None);
    let expected: Vec<Id> = users.iter().rev().cloned().collect();
    assert_eq!(full.items.iter().map(|e| e.id().clone()).collect::<Vec<_>>(), expected);

    // 2. Pages of seven, each resumed from the previous cursor
    let mut paged = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;
    loop {
        let mut pipeline = ctx.pipeline(7, cursor.as_deref());
        let stage = from_ids([owner.clone()])
            .read_graph_connections(&mut pipeline, ctx.graph.clone(), "users", Direction::Outgoing)
            .load_entities(&pipeline, ctx.manager.clone());
        let page = ResultsPageCollector::for_context(&pipeline).collect(stage)?;
        pages += 1;
        assert!(page.len() <= 7);
        paged.extend(page.items.into_iter().map(|e| e.id().clone()));
        cursor = page.cursor;
        if cursor.is_none() {
            break;
        }
    }

    // 3. No overlap and no gap
    assert_eq!(pages, 4);
    assert_eq!(paged, expected);
    Ok(())
}

#[test]
fn test_two_hop_pages_resume_exactly() -> PipelineResult<()> {
    let ctx = create_context();
    let owner = ctx.scope.application().clone();

    // 1. Two groups of the owner, three members in each
    let mut members = BTreeSet::new();
    let mut ts = 0;
    for _ in 0..2 {
        let group = Id::generate("group");
        ts += 1;
        ctx.connect(&owner, "groups", &group, ts);
        for _ in 0..3 {
            let member = Id::generate("user");
            ts += 1;
            ctx.connect(&group, "members", &member, ts);
            members.insert(member);
        }
    }
    let members_of_groups = |pipeline: &mut PipelineContext| {
        let groups = from_ids([owner.clone()]).read_graph_connections(
            pipeline,
            ctx.graph.clone(),
            "groups",
            Direction::Outgoing,
        );
        groups.read_graph_connections(pipeline, ctx.graph.clone(), "members", Direction::Outgoing)
    };

    // 2. A single scan reaches every member
    let full = ctx.page_ids(100, members_of_groups)?.concat();
    assert_eq!(full.len(), 6);
    assert_eq!(full.iter().cloned().collect::<BTreeSet<_>>(), members);

    // 3. Pages of every size add up to the same members in the same order
    for limit in 1..=5 {
        let pages = ctx.page_ids(limit, members_of_groups)?;
        assert_eq!(pages.concat(), full, "pages of {limit}");
    }
    Ok(())
}

#[test]
fn test_pages_over_several_start_ids() -> PipelineResult<()> {
    let ctx = create_context();
    let first = Id::generate("group");
    let second = Id::generate("group");
    let first_users = ctx.connected_users(&first, 5);
    let second_users = ctx.connected_users(&second, 4);

    let users_of_both = |pipeline: &mut PipelineContext| {
        from_ids([first.clone(), second.clone()]).read_graph_connections(
            pipeline,
            ctx.graph.clone(),
            "users",
            Direction::Outgoing,
        )
    };

    // 1. The full scan reads each start id in turn, newest edge first
    let full = ctx.page_ids(100, users_of_both)?.concat();
    let expected: Vec<Id> = first_users
        .iter()
        .rev()
        .chain(second_users.iter().rev())
        .cloned()
        .collect();
    assert_eq!(full, expected);

    // 2. Pages ending inside, at the end of, and past the first id's edges
    for limit in [2, 3, 5, 6] {
        let pages = ctx.page_ids(limit, users_of_both)?;
        assert_eq!(pages.concat(), expected, "pages of {limit}");
        assert!(pages[..pages.len() - 1].iter().all(|p| p.len() == limit));
    }
    Ok(())
}

#[test]
fn test_incoming_connections() -> PipelineResult<()> {
    let ctx = create_context();
    let owner = ctx.scope.application().clone();
    let users = ctx.connected_users(&owner, 3);

    let mut pipeline = ctx.pipeline(10, None);
    let stage = from_ids([users[1].clone()]).read_graph_connections(
        &mut pipeline,
        ctx.graph.clone(),
        "users",
        Direction::Incoming,
    );
    let page = collect_ids(&pipeline, stage)?;
    assert_eq!(page.items, vec![owner]);
    assert_eq!(page.cursor, None);
    Ok(())
}

#[test]
fn test_stale_candidates_leave_a_short_page() -> PipelineResult<()> {
    let ctx = create_context();
    let users = ctx.indexed_users(10);

    // 1. Four random candidates go stale, two deleted and two updated
    let stale: Vec<usize> = sample(&mut rand::rng(), users.len(), 4).into_vec();
    for &i in &stale[..2] {
        ctx.manager.delete_latest(&ctx.scope, &users[i])?;
    }
    for &i in &stale[2..] {
        ctx.write_user(&users[i], 100);
    }

    // 2. A page larger than the index holds exactly the valid entities, without a cursor
    let collector = SearchCollector::new(
        ctx.manager.clone(),
        ctx.index.clone(),
        PipelineConfig::default(),
    );
    let mut pipeline = ctx.pipeline(20, None);
    let page = collector.collect(&mut pipeline, &ctx.users_edge())?;
    let expected: Vec<Id> = (0..users.len())
        .filter(|i| !stale.contains(i))
        .map(|i| users[i].clone())
        .collect();
    assert_eq!(page.items.iter().map(|e| e.id().clone()).collect::<Vec<_>>(), expected);
    assert_eq!(page.cursor, None);

    // 3. Stale candidates were removed from the index
    assert_eq!(ctx.index.len(&ctx.scope, &ctx.users_edge()), 6);
    Ok(())
}

#[test]
fn test_requery_fills_the_page() -> PipelineResult<()> {
    let ctx = create_context();
    let users = ctx.indexed_users(10);
    for user in &users[..4] {
        ctx.manager.delete_latest(&ctx.scope, user)?;
    }
    let collector = SearchCollector::new(
        ctx.manager.clone(),
        ctx.index.clone(),
        PipelineConfig::default(),
    );

    // 1. Four of the first five candidates are stale; the next query makes up the difference
    let mut pipeline = ctx.pipeline(5, None);
    let first = collector.collect(&mut pipeline, &ctx.users_edge())?;
    assert_eq!(first.len(), 5);
    assert_eq!(first.items.iter().map(number).collect::<Vec<_>>(), vec![4, 5, 6, 7, 8]);
    assert!(first.cursor.is_some());

    // 2. The cursor resumes after the last candidate examined
    let mut pipeline = ctx.pipeline(5, first.cursor.as_deref());
    let second = collector.collect(&mut pipeline, &ctx.users_edge())?;
    assert_eq!(second.items.iter().map(number).collect::<Vec<_>>(), vec![9]);
    assert_eq!(second.cursor, None);
    Ok(())
}

#[test]
fn test_requery_budget_is_bounded() -> PipelineResult<()> {
    let ctx = create_context();
    let users = ctx.indexed_users(30);
    for user in &users[..24] {
        ctx.manager.delete_latest(&ctx.scope, user)?;
    }
    let collector = SearchCollector::new(
        ctx.manager.clone(),
        ctx.index.clone(),
        PipelineConfig::default(),
    );

    // 1. Eleven queries of two candidates each find nothing valid
    let mut pipeline = ctx.pipeline(2, None);
    let first = collector.collect(&mut pipeline, &ctx.users_edge())?;
    assert!(first.is_empty());
    assert!(first.cursor.is_some());
    assert_eq!(ctx.index.len(&ctx.scope, &ctx.users_edge()), 30 - 22);

    // 2. The next page picks up where the budget ran out
    let mut pipeline = ctx.pipeline(2, first.cursor.as_deref());
    let second = collector.collect(&mut pipeline, &ctx.users_edge())?;
    assert_eq!(second.items.iter().map(number).collect::<Vec<_>>(), vec![24, 25]);
    assert!(second.cursor.is_some());
    Ok(())
}

#[test]
fn test_search_stage_is_lazy_and_resumable() -> PipelineResult<()> {
    let ctx = create_context();
    let users = ctx.indexed_users(9);
    ctx.manager.delete_latest(&ctx.scope, &users[0])?;

    // 1. Building the pipeline reads nothing
    let mut pipeline = ctx.pipeline(4, None);
    let stage = search_candidates(&mut pipeline, ctx.index.clone(), ctx.users_edge())?
        .verify_candidates(&pipeline, ctx.manager.clone(), ctx.index.clone());
    assert_eq!(ctx.index.len(&ctx.scope, &ctx.users_edge()), 9);

    // 2. Pulling a page verifies as many candidates as it needs
    let first = ResultsPageCollector::for_context(&pipeline).collect(stage)?;
    assert_eq!(first.items.iter().map(number).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert_eq!(ctx.index.len(&ctx.scope, &ctx.users_edge()), 8);

    // 3. The next page resumes after the last returned candidate
    let mut pipeline = ctx.pipeline(4, first.cursor.as_deref());
    let stage = search_candidates(&mut pipeline, ctx.index.clone(), ctx.users_edge())?
        .verify_candidates(&pipeline, ctx.manager.clone(), ctx.index.clone());
    let second = ResultsPageCollector::for_context(&pipeline).collect(stage)?;
    assert_eq!(second.items.iter().map(number).collect::<Vec<_>>(), vec![5, 6, 7, 8]);
    let ids: BTreeSet<_> = first
        .items
        .iter()
        .chain(&second.items)
        .map(|e| e.id().clone())
        .collect();
    assert_eq!(ids.len(), 8);
    Ok(())
}
