//! Priority voting.

use std::sync::Arc;

use entity_events_core::content::Content;
use entity_events_core::event::{Event, Priority};
use entity_events_core::processor::EntityEventProcessor;

/// Returns the highest priority voted by `processors` for `event`, or `None`
/// when no processor votes.
pub fn evaluate_priority<C: Content>(
    event: &Event<C>,
    processors: &[Arc<dyn EntityEventProcessor<C>>],
) -> Option<Priority> {
    processors
        .iter()
        .filter_map(|processor| processor.priority_vote(event))
        .max()
}

/// Priority a child event is queued with: its explicit priority, else the
/// highest vote, else the parent's priority.
pub fn resolve_child_priority<C: Content>(
    child: &Event<C>,
    parent: &Event<C>,
    processors: &[Arc<dyn EntityEventProcessor<C>>],
) -> Priority {
    child
        .priority
        .or_else(|| evaluate_priority(child, processors))
        .or(parent.priority)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_events_core::event::CoreEventType;
    use entity_events_test_support::{StepProcessor, TestContent};

    fn processors(votes: &[Option<Priority>]) -> Vec<Arc<dyn EntityEventProcessor<TestContent>>> {
        votes
            .iter()
            .enumerate()
            .map(|(i, vote)| {
                let processor = StepProcessor::new(format!("p{i}"), 0, "");
                let processor = match vote {
                    Some(priority) => processor.voting(*priority),
                    None => processor,
                };
                Arc::new(processor) as Arc<dyn EntityEventProcessor<TestContent>>
            })
            .collect()
    }

    #[test]
    fn test_highest_vote_wins() {
        let event = Event::new(CoreEventType::Update, TestContent::identity("x"));

        let priority = evaluate_priority(
            &event,
            &processors(&[Some(Priority::Normal), Some(Priority::High), None]),
        );

        assert_eq!(priority, Some(Priority::High));
    }

    #[test]
    fn test_no_votes_is_none() {
        let event = Event::new(CoreEventType::Update, TestContent::identity("x"));

        assert_eq!(evaluate_priority(&event, &processors(&[None, None])), None);
        assert_eq!(evaluate_priority(&event, &[]), None);
    }

    #[test]
    fn test_child_priority_precedence() {
        // Arrange
        let parent = Event::new(CoreEventType::Update, TestContent::identity("p"))
            .with_priority(Priority::High);
        let unvoted = Event::new(CoreEventType::Notify, TestContent::identity("c"));
        let explicit = unvoted.clone().with_priority(Priority::Normal);
        let voters = processors(&[Some(Priority::Immediate)]);

        // Act / Assert
        assert_eq!(
            resolve_child_priority(&explicit, &parent, &voters),
            Priority::Normal
        );
        assert_eq!(
            resolve_child_priority(&unvoted, &parent, &voters),
            Priority::Immediate
        );
        assert_eq!(resolve_child_priority(&unvoted, &parent, &[]), Priority::High);

        let root = Event::new(CoreEventType::Update, TestContent::identity("p"));
        assert_eq!(resolve_child_priority(&unvoted, &root, &[]), Priority::Normal);
    }
}
