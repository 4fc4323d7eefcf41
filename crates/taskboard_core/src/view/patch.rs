use crate::model::item::BoardItem;
use crate::model::ordered::OrderedItem;
use crate::reorder::ReorderPlan;
use crate::view::sort_items;

/// Applies a reorder plan to full items, adding `entering` when given.
///
/// `entering` must already carry the order the plan assigns to it.
pub(crate) fn patch_items(
    items: &[BoardItem],
    plan: &ReorderPlan,
    entering: Option<BoardItem>,
) -> Vec<BoardItem> {
    let mapping = plan.mapping();
    let removed = plan.removed().map(|entry| entry.id);
    let mut patched: Vec<BoardItem> = items
        .iter()
        .filter(|item| Some(item.item_id()) != removed)
        .cloned()
        .map(|mut item| {
            if let Some(order) = mapping.get(&item.item_id()) {
                item.set_order(*order);
            }
            item
        })
        .collect();
    patched.extend(entering);
    sort_items(&mut patched);
    patched
}
