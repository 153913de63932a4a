use dsq_common::{DsqError, Result};

use crate::relation::{MultiSourceSelect, TwoTableJoin};
use crate::tree::{build_two_table_join_tree, two_table_join};

/// Whether the consumer may still defer output collection to a fetch phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    MaybeFetch,
    Never,
}

/// Replacement statement offered by the fetch-rewrite collaborator: the same
/// select with a lighter top-level projection, plus the phase that
/// re-attaches the deferred outputs above the query plan.
pub struct FetchPushDown<P> {
    pub replaced: MultiSourceSelect,
    pub phase: P,
}

/// Result of planning a multi-source select.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinPlan<P, F> {
    /// The join tree planned directly.
    Direct(P),
    /// Two-phase structure: run the lighter query, then fetch the deferred
    /// outputs.
    QueryThenFetch { query: P, fetch_phase: F },
}

/// Collaborator contract for the join planner.
///
/// Downstream physical planning and the fetch rewrite are other components'
/// concerns; the planner only consumes their output through this trait.
pub trait ConsumerContext {
    /// Physical plan produced for a relation tree.
    type Plan;
    /// Fetch phase produced by the fetch-rewrite collaborator.
    type FetchPhase;

    /// Turn a planned join tree into an executable plan.
    fn plan_sub_relation(&mut self, relation: TwoTableJoin) -> Result<Self::Plan>;

    fn fetch_mode(&self) -> FetchMode;

    fn set_fetch_mode(&mut self, mode: FetchMode);

    /// Sink for unsupported-feature rejections; no plan is produced after a
    /// validation error.
    fn validation_error(&mut self, error: DsqError);

    /// Offer a fetch rewrite for the statement; `None` keeps the direct plan.
    fn fetch_push_down(&mut self, mss: &MultiSourceSelect) -> Option<FetchPushDown<Self::FetchPhase>>;
}

/// Plan an analyzed multi-source select.
///
/// Unsupported shapes are reported through the context's validation sink and
/// yield `Ok(None)`. Internal invariant violations abort with an error.
pub fn plan<C: ConsumerContext>(
    mss: MultiSourceSelect,
    ctx: &mut C,
) -> Result<Option<JoinPlan<C::Plan, C::FetchPhase>>> {
    if !mss.spec.group_by.is_empty() {
        ctx.validation_error(DsqError::Unsupported(
            "GROUP BY on JOINS is not supported".to_string(),
        ));
        return Ok(None);
    }
    if mss.spec.has_aggregates {
        ctx.validation_error(DsqError::Unsupported(
            "AGGREGATIONS on JOINS are not supported".to_string(),
        ));
        return Ok(None);
    }

    if !mss.fetch_eligible {
        ctx.set_fetch_mode(FetchMode::Never);
    }
    if ctx.fetch_mode() == FetchMode::Never {
        return Ok(Some(JoinPlan::Direct(plan_join_tree(mss, ctx)?)));
    }

    match ctx.fetch_push_down(&mss) {
        None => Ok(Some(JoinPlan::Direct(plan_join_tree(mss, ctx)?))),
        Some(push_down) => {
            ctx.set_fetch_mode(FetchMode::Never);
            let query = plan_join_tree(push_down.replaced, ctx)?;
            Ok(Some(JoinPlan::QueryThenFetch {
                query,
                fetch_phase: push_down.phase,
            }))
        }
    }
}

fn plan_join_tree<C: ConsumerContext>(mss: MultiSourceSelect, ctx: &mut C) -> Result<C::Plan> {
    let join = if mss.sources.len() == 2 {
        two_table_join(mss)?
    } else {
        build_two_table_join_tree(mss)?
    };
    ctx.plan_sub_relation(join)
}
