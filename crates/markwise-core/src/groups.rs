//! OR-group selection and sub-question summation.
//!
//! Each question unit becomes a *slot*: standalone units are their own slot,
//! and the members of an OR-group share one slot that takes the best
//! attempted member. Slots are then summed per main question number.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::{OrGroup, QuestionUnit};

/// Marks for one answered question unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuestionMark {
    pub marks_awarded: f64,
    /// False for blank answers; they do not compete in an OR-group.
    pub attempted: bool,
}

/// One resolved slot of a main question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSlot {
    /// Label of the counted unit ("2a"), or of the group's first member.
    pub label: String,
    #[serde(default)]
    pub or_group: Option<String>,
    /// The unit whose marks count; `None` when nothing was attempted.
    pub selected_question_id: Option<String>,
    pub marks: f64,
    pub max_marks: f64,
}

/// A main question with its marks summed over slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedQuestion {
    pub main_question_number: u32,
    pub marks: f64,
    pub max_marks: f64,
    pub slots: Vec<ResolvedSlot>,
}

/// A whole paper resolved for one student.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPaper {
    pub questions: Vec<ResolvedQuestion>,
    pub total_marks: f64,
    pub total_possible_marks: f64,
}

enum SlotSpec {
    Single(usize),
    Group { group_id: String, members: Vec<usize> },
}

/// Resolves per-unit marks into per-question marks for one paper.
pub struct GroupResolver {
    questions: Vec<QuestionUnit>,
    slots: Vec<SlotSpec>,
}

impl GroupResolver {
    pub fn new(questions: &[QuestionUnit]) -> Self {
        let questions = questions.to_vec();
        let with_subs: Vec<u32> = questions
            .iter()
            .filter(|q| q.sub_question.is_some())
            .map(|q| q.main_question_number)
            .collect();

        let index: HashMap<&str, usize> = questions
            .iter()
            .enumerate()
            .map(|(i, q)| (q.id.as_str(), i))
            .collect();
        let groups = OrGroup::collect(&questions);

        let mut slots = Vec::new();
        let mut seen_groups: Vec<&str> = Vec::new();
        for (i, q) in questions.iter().enumerate() {
            if q.sub_question.is_none() && with_subs.contains(&q.main_question_number) {
                tracing::warn!(
                    question = %q.id,
                    main = q.main_question_number,
                    "parent question has sub-questions; its own marks are ignored"
                );
                continue;
            }
            match &q.or_group_id {
                None => slots.push(SlotSpec::Single(i)),
                Some(group_id) if seen_groups.contains(&group_id.as_str()) => {}
                Some(group_id) => {
                    seen_groups.push(group_id);
                    let members: Vec<usize> = groups
                        .iter()
                        .find(|g| &g.group_id == group_id)
                        .map(|g| {
                            g.member_question_ids
                                .iter()
                                .filter_map(|id| index.get(id.as_str()).copied())
                                .filter(|&m| {
                                    let unit = &questions[m];
                                    unit.sub_question.is_some()
                                        || !with_subs.contains(&unit.main_question_number)
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    if members.is_empty() {
                        tracing::warn!(group = %group_id, "OR-group has no countable member");
                        continue;
                    }
                    slots.push(SlotSpec::Group {
                        group_id: group_id.clone(),
                        members,
                    });
                }
            }
        }

        for group in &groups {
            if !seen_groups.contains(&group.group_id.as_str()) {
                tracing::warn!(
                    group = %group.group_id,
                    "every OR-group member is a parent with sub-questions; the group is dropped"
                );
            }
        }

        Self { questions, slots }
    }

    /// Resolve one student's marks. Units missing from `marks` count as
    /// unattempted with zero marks.
    pub fn resolve(&self, marks: &HashMap<String, QuestionMark>) -> ResolvedPaper {
        let mut by_main: BTreeMap<u32, Vec<ResolvedSlot>> = BTreeMap::new();
        for entry in &self.slots {
            let (main, slot) = match entry {
                SlotSpec::Single(i) => {
                    let q = &self.questions[*i];
                    let mark = marks.get(&q.id);
                    let awarded = mark.map_or(0.0, |m| m.marks_awarded);
                    (
                        q.main_question_number,
                        ResolvedSlot {
                            label: q.label(),
                            or_group: None,
                            selected_question_id: mark
                                .filter(|m| m.attempted)
                                .map(|_| q.id.clone()),
                            marks: awarded.clamp(0.0, q.max_marks),
                            max_marks: q.max_marks,
                        },
                    )
                }
                SlotSpec::Group { group_id, members } => {
                    let Some(slot) = self.resolve_group(group_id, members, marks) else {
                        continue;
                    };
                    slot
                }
            };
            by_main.entry(main).or_default().push(slot);
        }

        let questions: Vec<ResolvedQuestion> = by_main
            .into_iter()
            .map(|(main_question_number, slots)| ResolvedQuestion {
                main_question_number,
                marks: slots.iter().map(|s| s.marks).sum(),
                max_marks: slots.iter().map(|s| s.max_marks).sum(),
                slots,
            })
            .collect();
        ResolvedPaper {
            total_marks: questions.iter().map(|q| q.marks).sum(),
            total_possible_marks: questions.iter().map(|q| q.max_marks).sum(),
            questions,
        }
    }

    /// Best attempted member: highest marks, then highest percentage
    /// (smaller max), then smallest question id.
    fn resolve_group(
        &self,
        group_id: &str,
        members: &[usize],
        marks: &HashMap<String, QuestionMark>,
    ) -> Option<(u32, ResolvedSlot)> {
        let Some(&first) = members.first() else {
            tracing::warn!(group = %group_id, "OR-group has no members to resolve");
            return None;
        };
        let first = &self.questions[first];
        let best = members
            .iter()
            .map(|&i| &self.questions[i])
            .filter_map(|q| {
                marks
                    .get(&q.id)
                    .filter(|m| m.attempted)
                    .map(|m| (q, m.marks_awarded.clamp(0.0, q.max_marks)))
            })
            .min_by(|(qa, ma), (qb, mb)| {
                mb.total_cmp(ma)
                    .then(qa.max_marks.total_cmp(&qb.max_marks))
                    .then(qa.id.cmp(&qb.id))
            });

        let slot = match best {
            Some((q, awarded)) => ResolvedSlot {
                label: q.label(),
                or_group: Some(group_id.to_string()),
                selected_question_id: Some(q.id.clone()),
                marks: awarded,
                max_marks: q.max_marks,
            },
            None => ResolvedSlot {
                label: first.label(),
                or_group: Some(group_id.to_string()),
                selected_question_id: None,
                marks: 0.0,
                max_marks: members
                    .iter()
                    .map(|&i| self.questions[i].max_marks)
                    .fold(0.0, f64::max),
            },
        };
        let main = best.map_or(first.main_question_number, |(q, _)| q.main_question_number);
        Some((main, slot))
    }
}
