//! Boolean query planning over bitmap sets
//!
//! The parser emits `a -b` as `must: [a, bool{must_not: [b]}]`; planning
//! first hoists such pure negations into the parent's must_not list, then
//! dispatches on which clause lists are populated.

use super::docset::{intersect_all, union_all, DocSet};
use super::{Hit, Searcher};
use crate::error::{Result, SkaldError};
use crate::query::Query;

/// Hoist pure-negation children of must/should into the parent must_not
fn flatten<'q>(
    must: &'q [Query],
    should: &'q [Query],
    must_not: &'q [Query],
) -> (Vec<&'q Query>, Vec<&'q Query>, Vec<&'q Query>) {
    let mut flat_must = Vec::with_capacity(must.len());
    let mut flat_should = Vec::with_capacity(should.len());
    let mut flat_must_not: Vec<&Query> = must_not.iter().collect();

    for clause in must {
        match clause {
            Query::Bool { must_not: inner, .. } if clause.is_pure_must_not() => {
                flat_must_not.extend(inner.iter());
            }
            _ => flat_must.push(clause),
        }
    }

    for clause in should {
        match clause {
            Query::Bool { must_not: inner, .. } if clause.is_pure_must_not() => {
                flat_must_not.extend(inner.iter());
            }
            _ => flat_should.push(clause),
        }
    }

    (flat_must, flat_should, flat_must_not)
}

impl Searcher<'_> {
    pub(crate) fn bool_search(
        &self,
        must: &[Query],
        should: &[Query],
        must_not: &[Query],
    ) -> Result<Vec<Hit>> {
        let (must, should, must_not) = flatten(must, should, must_not);

        match (must.is_empty(), should.is_empty(), must_not.is_empty()) {
            (true, true, false) => Err(SkaldError::InvalidQuery(
                "NOT queries require a positive clause".to_string(),
            )),
            (true, false, true) => self.execute_or(&should),
            (false, true, true) => self.execute_and(&must),
            (false, true, false) => self.execute_and_not(&must, &must_not),
            (true, false, false) => self.execute_or_not(&should, &must_not),
            (false, false, _) => self.execute_complex(&must, &should, &must_not),
            (true, true, true) => Ok(Vec::new()),
        }
    }

    fn execute_or(&self, queries: &[&Query]) -> Result<Vec<Hit>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        if queries.len() == 1 {
            return self.execute(queries[0]);
        }

        let Some(sets) = self.collect_docsets(queries, false)? else {
            return Ok(Vec::new());
        };

        match union_all(sets) {
            Some(result) if !result.is_empty() => Ok(self.materialize(&result, None)),
            _ => Ok(Vec::new()),
        }
    }

    fn execute_and(&self, queries: &[&Query]) -> Result<Vec<Hit>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        if queries.len() == 1 {
            return self.execute(queries[0]);
        }

        let Some(sets) = self.collect_docsets(queries, true)? else {
            return Ok(Vec::new());
        };

        match intersect_all(sets) {
            Some(result) if !result.is_empty() => Ok(self.materialize(&result, None)),
            _ => Ok(Vec::new()),
        }
    }

    fn execute_and_not(&self, must: &[&Query], must_not: &[&Query]) -> Result<Vec<Hit>> {
        let Some(sets) = self.collect_docsets(must, true)? else {
            return Ok(Vec::new());
        };
        let Some(result) = intersect_all(sets) else {
            return Ok(Vec::new());
        };
        if result.is_empty() {
            return Ok(Vec::new());
        }

        let result = self.subtract_not(result, must_not)?;
        if result.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.materialize(&result, None))
    }

    fn execute_or_not(&self, should: &[&Query], must_not: &[&Query]) -> Result<Vec<Hit>> {
        let Some(sets) = self.collect_docsets(should, false)? else {
            return Ok(Vec::new());
        };
        let Some(result) = union_all(sets) else {
            return Ok(Vec::new());
        };
        if result.is_empty() {
            return Ok(Vec::new());
        }

        let result = self.subtract_not(result, must_not)?;
        if result.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.materialize(&result, None))
    }

    fn execute_complex(
        &self,
        must: &[&Query],
        should: &[&Query],
        must_not: &[&Query],
    ) -> Result<Vec<Hit>> {
        let Some(sets) = self.collect_docsets(must, true)? else {
            return Ok(Vec::new());
        };
        let Some(mut result) = intersect_all(sets) else {
            return Ok(Vec::new());
        };
        if result.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(should_sets) = self.collect_docsets(should, false)? {
            if let Some(should_union) = union_all(should_sets) {
                result = result.intersect(&should_union);
            }
        }
        if result.is_empty() {
            return Ok(Vec::new());
        }

        let result = self.subtract_not(result, must_not)?;
        if result.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.materialize(&result, None))
    }

    /// Execute queries into docsets. With `require_non_empty`, an empty
    /// result short-circuits to `None` (AND with nothing is nothing);
    /// otherwise empty sets are simply dropped.
    fn collect_docsets(
        &self,
        queries: &[&Query],
        require_non_empty: bool,
    ) -> Result<Option<Vec<DocSet>>> {
        let mut sets = Vec::with_capacity(queries.len());
        for query in queries {
            let ds = self.query_to_docset(query)?;
            if ds.is_empty() {
                if require_non_empty {
                    return Ok(None);
                }
                continue;
            }
            sets.push(ds);
        }
        Ok(Some(sets))
    }

    fn subtract_not(&self, result: DocSet, must_not: &[&Query]) -> Result<DocSet> {
        if must_not.is_empty() {
            return Ok(result);
        }

        let Some(not_sets) = self.collect_docsets(must_not, false)? else {
            return Ok(result);
        };
        match union_all(not_sets) {
            Some(not_union) => Ok(result.subtract(&not_union)),
            None => Ok(result),
        }
    }

    /// Turn any query into a docset. Terms have a direct bitmap path; other
    /// primitives execute to hits first and are resolved back to docnums.
    fn query_to_docset(&self, query: &Query) -> Result<DocSet> {
        match query {
            Query::Term { field, term } => {
                self.term_docset(&term.to_lowercase(), field.as_deref())
            }
            Query::MatchAll | Query::MatchNone => {
                Ok(DocSet::new(self.snapshot().segments().len()))
            }
            _ => {
                let hits = self.execute(query)?;
                Ok(self.hits_to_docset(&hits))
            }
        }
    }

    fn hits_to_docset(&self, hits: &[Hit]) -> DocSet {
        let segments = self.snapshot().segments();
        let mut ds = DocSet::new(segments.len());
        if hits.is_empty() {
            return ds;
        }

        let builder = self.snapshot().builder().read();
        for hit in hits {
            for (i, snap) in segments.iter().enumerate() {
                if let Ok(Some(doc_num)) = snap.segment().doc_num(&hit.doc_id) {
                    if !snap.deleted().contains(doc_num as u32) {
                        ds.segment_docs[i].insert(doc_num as u32);
                        break;
                    }
                }
            }
            if let Some(doc_num) = builder.find_doc_num(&hit.doc_id) {
                ds.builder_docs.insert(doc_num as u32);
            }
        }

        ds
    }
}
