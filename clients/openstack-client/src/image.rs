// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Glance v2: image lookup

use crate::exactly_one;
use crate::Client;
use crate::Error;
use crate::Named;
use reqwest::Method;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct ImageView {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl Named for ImageView {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Deserialize)]
struct ImageList {
    images: Vec<ImageView>,
}

impl Client {
    pub async fn image_find(
        &self,
        name: &str,
    ) -> Result<Option<ImageView>, Error> {
        let url = format!("{}/v2/images", self.endpoints.image);
        let builder =
            self.request(Method::GET, &url).query(&[("name", name)]);
        let list: ImageList = self.get(builder).await?;
        exactly_one("image", name, list.images)
    }
}
