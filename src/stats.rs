use fnv::FnvHashMap;

/// Bidirectional mapping between external identifiers and dense zero-based indices.
pub struct DataDictionary {
    user_dict: FnvHashMap<String,u32>,
    item_dict: FnvHashMap<String,u32>,
    num_interactions: u64,
}

impl DataDictionary {

    pub fn num_users(&self) -> usize {
        self.user_dict.len()
    }

    pub fn num_items(&self) -> usize {
        self.item_dict.len()
    }

    pub fn num_interactions(&self) -> u64 {
        self.num_interactions
    }

    /// `None` for identifiers outside of the training population.
    pub fn user_index(&self, name: &str) -> Option<u32> {
        self.user_dict.get(name).cloned()
    }

    pub fn item_index(&self, name: &str) -> Option<u32> {
        self.item_dict.get(name).cloned()
    }
}

impl DataDictionary {

    /// Assigns consecutive indices in order of first appearance.
    pub fn from_interactions<I, S>(interactions: I) -> Self
        where I: IntoIterator<Item=(S, S)>, S: AsRef<str> {

        let mut user_index: u32 = 0;
        let mut user_dict: FnvHashMap<String,u32> =
            FnvHashMap::with_capacity_and_hasher(100, Default::default());

        let mut item_index: u32 = 0;
        let mut item_dict: FnvHashMap<String,u32> =
            FnvHashMap::with_capacity_and_hasher(100, Default::default());

        let mut num_interactions: u64 = 0;

        for (user, item) in interactions {

            if !user_dict.contains_key(user.as_ref()) {
                user_dict.insert(user.as_ref().to_owned(), user_index);
                user_index += 1;
            }

            if !item_dict.contains_key(item.as_ref()) {
                item_dict.insert(item.as_ref().to_owned(), item_index);
                item_index += 1;
            }

            num_interactions += 1;
        }

        DataDictionary { user_dict, item_dict, num_interactions }
    }
}

pub struct Renaming {
    user_names: FnvHashMap<u32,String>,
    item_names: FnvHashMap<u32,String>,
}

impl Renaming {

    pub fn user_name(&self, user_index: u32) -> &str {
        &self.user_names[&user_index]
    }

    pub fn item_name(&self, item_index: u32) -> &str {
        &self.item_names[&item_index]
    }
}

impl<'a> From<&'a DataDictionary> for Renaming {

    fn from(data_dict: &'a DataDictionary) -> Self {

        let mut user_names: FnvHashMap<u32,String> =
            FnvHashMap::with_capacity_and_hasher(data_dict.num_users(), Default::default());

        let mut item_names: FnvHashMap<u32,String> =
            FnvHashMap::with_capacity_and_hasher(data_dict.num_items(), Default::default());

        for (user, user_id) in data_dict.user_dict.iter() {
            user_names.insert(*user_id, user.clone());
        }

        for (item, item_id) in data_dict.item_dict.iter() {
            item_names.insert(*item_id, item.clone());
        }

        Renaming { user_names, item_names }
    }
}

#[cfg(test)]
mod tests {

    use crate::stats::{DataDictionary, Renaming};

    #[test]
    fn indices_in_order_of_appearance() {
        let data_dict = DataDictionary::from_interactions(vec![
            ("alice", "apple"),
            ("alice", "dog"),
            ("bob", "apple"),
            ("charles", "pony"),
        ]);

        assert_eq!(data_dict.num_users(), 3);
        assert_eq!(data_dict.num_items(), 3);
        assert_eq!(data_dict.num_interactions(), 4);

        assert_eq!(data_dict.user_index("bob"), Some(1));
        assert_eq!(data_dict.item_index("pony"), Some(2));
        assert_eq!(data_dict.user_index("dave"), None);
    }

    #[test]
    fn renaming_restores_names() {
        let data_dict = DataDictionary::from_interactions(vec![("alice", "apple"), ("bob", "dog")]);
        let renaming = Renaming::from(&data_dict);

        assert_eq!(renaming.user_name(1), "bob");
        assert_eq!(renaming.item_name(0), "apple");
    }
}
