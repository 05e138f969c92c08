//! Campaign funding metrics derived from the ledger.

use crate::{ledger::PAID_STATUSES, Error, Result};
use chrono::{Datelike, FixedOffset, TimeZone};
use entity::{campaign, donation};
use sea_orm::{
    sea_query::{
        Alias, Condition, Expr, Func, IntoCondition, JoinType, LikeExpr, SelectStatement,
    },
    ColumnTrait, ConnectionTrait, DbBackend, DbConn, DbErr, EntityTrait, FromQueryResult,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Select,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

const FUNDING: &str = "funding";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    /// substring of title, location or description
    pub q: Option<String>,
    /// `all` or empty matches every status
    pub status: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl Filter {
    pub fn page(&self) -> u64 {
        match self.page {
            Some(p) if p >= 1 => p as u64,
            _ => 1,
        }
    }

    pub fn page_size(&self) -> u64 {
        match self.page_size {
            Some(s) => s.clamp(1, MAX_PAGE_SIZE as i64) as u64,
            None => DEFAULT_PAGE_SIZE,
        }
    }

    fn offset(&self) -> u64 {
        (self.page() - 1).saturating_mul(self.page_size())
    }

    fn condition(&self) -> Condition {
        let mut cond = Condition::all();
        if let Some(q) = non_blank(self.q.as_deref()) {
            let pattern = format!("%{}%", escape_like(&q.to_lowercase()));
            let mut any = Condition::any();
            for col in [
                campaign::Column::Title,
                campaign::Column::Location,
                campaign::Column::Description,
            ] {
                any = any.add(
                    Expr::expr(Func::lower(Expr::col((campaign::Entity, col))))
                        .like(LikeExpr::new(pattern.clone()).escape('\\')),
                );
            }
            cond = cond.add(any);
        }
        if let Some(status) = non_blank(self.status.as_deref()) {
            if !status.eq_ignore_ascii_case("all") {
                cond = cond.add(
                    Expr::expr(Func::lower(Expr::col((
                        campaign::Entity,
                        campaign::Column::Status,
                    ))))
                    .eq(status.to_lowercase()),
                );
            }
        }
        cond
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Escape LIKE wildcards so user input only ever matches literally.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sort {
    #[default]
    Progress,
    Raised,
    Supporters,
    Newest,
}

impl From<&str> for Sort {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "raised" | "raised_amount" | "amount" => Sort::Raised,
            "supporters" | "donors" => Sort::Supporters,
            "newest" | "latest" | "created_at" => Sort::Newest,
            _ => Sort::Progress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub id: i32,
    pub title: String,
    pub location: String,
    pub description: String,
    pub status: String,
    pub goal: i64,
    pub raised_amount: i64,
    pub supporters: i64,
    /// percent of goal, one decimal
    pub progress: f64,
    pub created_at: i64,
}

impl CampaignSummary {
    fn new(c: campaign::Model, funding: Option<&Funding>) -> Self {
        let raised_amount = funding.and_then(|f| f.raised).unwrap_or_default();
        let supporters = funding.map(|f| f.supporters).unwrap_or_default();
        Self {
            progress: progress_tenths(raised_amount, c.goal) as f64 / 10.0,
            id: c.id,
            title: c.title,
            location: c.location,
            description: c.description,
            status: c.status,
            goal: c.goal,
            raised_amount,
            supporters,
            created_at: c.created_at,
        }
    }
}

/// `raised * 100 / goal` in tenths of a percent, rounded half up. 0 without goal.
pub fn progress_tenths(raised: i64, goal: i64) -> i64 {
    if goal <= 0 {
        return 0;
    }
    let raised = raised.max(0) as i128;
    let goal = goal as i128;
    ((raised * 1000 + goal / 2) / goal).min(i64::MAX as i128) as i64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// YYYY-MM
    pub month: String,
    pub value: i64,
    pub donations: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub item: CampaignSummary,
    pub series: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, FromQueryResult)]
struct Funding {
    campaign_id: i32,
    raised: Option<i64>,
    supporters: i64,
}

/// Bucket `(amount, paid_at or created_at)` rows by calendar month at `offset`.
pub fn monthly_series(
    rows: impl IntoIterator<Item = (i64, i64)>,
    offset: FixedOffset,
    continuous: bool,
) -> Vec<SeriesPoint> {
    let mut buckets: BTreeMap<(i32, u32), (i64, i64)> = BTreeMap::new();
    for (amount, time) in rows {
        let Some(dt) = offset.timestamp_opt(time, 0).single() else {
            continue;
        };
        let entry = buckets.entry((dt.year(), dt.month())).or_default();
        entry.0 += amount;
        entry.1 += 1;
    }

    if continuous {
        if let (Some(first), Some(last)) = (
            buckets.keys().next().copied(),
            buckets.keys().next_back().copied(),
        ) {
            let (mut y, mut m) = first;
            while (y, m) < last {
                buckets.entry((y, m)).or_default();
                if m == 12 {
                    y += 1;
                    m = 1;
                } else {
                    m += 1;
                }
            }
        }
    }

    buckets
        .into_iter()
        .map(|((y, m), (value, donations))| SeriesPoint {
            month: format!("{:04}-{:02}", y, m),
            value,
            donations,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    conn: DbConn,
    offset: FixedOffset,
}

impl Aggregator {
    /// `offset` is the zone monthly series are bucketed in
    pub fn new(conn: DbConn, offset: FixedOffset) -> Self {
        Self { conn, offset }
    }

    pub fn db(&self) -> &DbConn {
        &self.conn
    }

    pub async fn list_campaigns(
        &self,
        filter: &Filter,
        sort: Sort,
    ) -> Result<Page<CampaignSummary>> {
        self.list(filter, sort).await.map_err(Error::AggregationQuery)
    }

    pub async fn campaign(&self, id: i32) -> Result<Option<CampaignSummary>> {
        self.summary(id).await.map_err(Error::AggregationQuery)
    }

    pub async fn campaign_report(&self, id: i32, continuous: bool) -> Result<Option<Report>> {
        self.report(id, continuous)
            .await
            .map_err(Error::AggregationQuery)
    }

    async fn list(&self, filter: &Filter, sort: Sort) -> Result<Page<CampaignSummary>, DbErr> {
        let cond = filter.condition();
        let page = filter.page();
        let page_size = filter.page_size();
        let offset = filter.offset();
        let total = campaign::Entity::find()
            .filter(cond.clone())
            .count(self.db())
            .await?;
        if offset >= total {
            return Ok(Page {
                page,
                page_size,
                total,
                items: vec![],
            });
        }

        let mut select = campaign::Entity::find().filter(cond);
        QuerySelect::query(&mut select).join_subquery(
            JoinType::LeftJoin,
            self.funding_query(),
            Alias::new(FUNDING),
            Expr::col((Alias::new(FUNDING), donation::Column::CampaignId))
                .equals((campaign::Entity, campaign::Column::Id)),
        );
        let campaigns = self
            .order(select, sort)
            .offset(offset)
            .limit(page_size)
            .all(self.db())
            .await?;

        let ids = campaigns.iter().map(|c| c.id).collect::<Vec<_>>();
        let funding = self
            .funding(donation::Column::CampaignId.is_in(ids))
            .await?;
        let items = campaigns
            .into_iter()
            .map(|c| {
                let f = funding.get(&c.id);
                CampaignSummary::new(c, f)
            })
            .collect();

        Ok(Page {
            page,
            page_size,
            total,
            items,
        })
    }

    /// Descending sort key over the joined funding, ties broken by newest
    /// then highest id. Campaigns without a goal trail the progress order.
    fn order(&self, select: Select<campaign::Entity>, sort: Sort) -> Select<campaign::Entity> {
        let select = match sort {
            Sort::Progress => {
                let ratio = match self.db().get_database_backend() {
                    DbBackend::MySql => "CAST(COALESCE(funding.raised, 0) AS DOUBLE)",
                    _ => "CAST(COALESCE(funding.raised, 0) AS DOUBLE PRECISION)",
                };
                select
                    .order_by_asc(Expr::cust("CASE WHEN campaigns.goal > 0 THEN 0 ELSE 1 END"))
                    .order_by_desc(Expr::cust(format!(
                        "CASE WHEN campaigns.goal > 0 THEN {} / campaigns.goal ELSE 0 END",
                        ratio
                    )))
            }
            Sort::Raised => select.order_by_desc(Expr::cust("COALESCE(funding.raised, 0)")),
            Sort::Supporters => {
                select.order_by_desc(Expr::cust("COALESCE(funding.supporters, 0)"))
            }
            Sort::Newest => select,
        };
        select
            .order_by_desc(campaign::Column::CreatedAt)
            .order_by_desc(campaign::Column::Id)
    }

    async fn summary(&self, id: i32) -> Result<Option<CampaignSummary>, DbErr> {
        let Some(c) = campaign::Entity::find_by_id(id).one(self.db()).await? else {
            return Ok(None);
        };
        let funding = self.funding(donation::Column::CampaignId.eq(id)).await?;
        let f = funding.get(&c.id);
        Ok(Some(CampaignSummary::new(c, f)))
    }

    async fn report(&self, id: i32, continuous: bool) -> Result<Option<Report>, DbErr> {
        let Some(item) = self.summary(id).await? else {
            return Ok(None);
        };
        let rows = donation::Entity::find()
            .select_only()
            .column(donation::Column::Amount)
            .column(donation::Column::PaidAt)
            .column(donation::Column::CreatedAt)
            .filter(donation::Column::CampaignId.eq(id))
            .filter(donation::Column::Status.is_in(PAID_STATUSES))
            .order_by_asc(donation::Column::Id)
            .into_tuple::<(i64, Option<i64>, i64)>()
            .all(self.db())
            .await?;
        let series = monthly_series(
            rows.into_iter()
                .map(|(amount, paid_at, created_at)| (amount, paid_at.unwrap_or(created_at))),
            self.offset,
            continuous,
        );
        Ok(Some(Report { item, series }))
    }

    /// Paid sum and distinct payers grouped by campaign.
    fn funding_query(&self) -> SelectStatement {
        let sum = match self.db().get_database_backend() {
            DbBackend::MySql => "CAST(SUM(amount) AS SIGNED)",
            _ => "CAST(SUM(amount) AS BIGINT)",
        };
        donation::Entity::find()
            .select_only()
            .column(donation::Column::CampaignId)
            .column_as(Expr::cust(sum), "raised")
            .column_as(Expr::cust("COUNT(DISTINCT payer_id)"), "supporters")
            .filter(donation::Column::Status.is_in(PAID_STATUSES))
            .group_by(donation::Column::CampaignId)
            .into_query()
    }

    async fn funding(
        &self,
        campaigns: impl IntoCondition,
    ) -> Result<BTreeMap<i32, Funding>, DbErr> {
        let mut query = self.funding_query();
        query.cond_where(campaigns);
        let stmt = self.db().get_database_backend().build(&query);
        let rows = Funding::find_by_statement(stmt).all(self.db()).await?;
        Ok(rows.into_iter().map(|f| (f.campaign_id, f)).collect())
    }
}
