use super::{DrawCall, DrawCategory, DrawGroup};

/// A call together with its group
#[derive(Debug, Clone, Copy)]
pub struct DrawItem<'a> {
    /// Owning group
    pub group: &'a DrawGroup,
    /// The call
    pub call: &'a DrawCall,
}

/// Lazy iterator over selected draw lists
pub struct DrawIter<'a, P> {
    groups: &'a [DrawGroup],
    lists: &'a [[Vec<DrawCall>; 2]; 4],
    categories: &'a [DrawCategory],
    respect_visibility: bool,
    predicate: P,
    category: usize,
    instanced: usize,
    index: usize,
}

impl<'a, P> DrawIter<'a, P>
where
    P: Fn(&DrawItem<'a>) -> bool,
{
    pub(super) fn new(
        groups: &'a [DrawGroup],
        lists: &'a [[Vec<DrawCall>; 2]; 4],
        categories: &'a [DrawCategory],
        respect_visibility: bool,
        predicate: P,
    ) -> Self {
        Self { groups, lists, categories, respect_visibility, predicate, category: 0, instanced: 0, index: 0 }
    }
}

impl<'a, P> Iterator for DrawIter<'a, P>
where
    P: Fn(&DrawItem<'a>) -> bool,
{
    type Item = DrawItem<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(category) = self.categories.get(self.category) {
            let list = &self.lists[category.index()][self.instanced];
            if let Some(call) = list.get(self.index) {
                self.index += 1;
                let Some(group) = self.groups.get(call.group) else { continue };
                if self.respect_visibility && !group.visible {
                    continue;
                }
                let item = DrawItem { group, call };
                if (self.predicate)(&item) {
                    return Some(item);
                }
                continue;
            }
            self.index = 0;
            if self.instanced == 0 {
                self.instanced = 1;
            } else {
                self.instanced = 0;
                self.category += 1;
            }
        }
        None
    }
}
